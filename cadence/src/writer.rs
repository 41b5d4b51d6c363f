//! Streaming writer for live telemetry.
//!
//! A writer holds one stream to the writer endpoint. Opening it locks a set
//! of channels on the server; every later request carries segments for those
//! channels. The server does not acknowledge individual writes. It answers
//! only when something goes wrong, and then ends the stream, so a write that
//! finds a response already waiting is refused without sending.
//!
//! # Write Flow ([`TypedWriter`])
//!
//! 1. Resolve the channel through the registry
//! 2. Check the buffer's element type against the channel's data type
//! 3. Build the segment
//! 4. Check contiguity against the channel's high-water mark
//! 5. Split the segment at the configured threshold
//! 6. Send the pieces through the [`CoreWriter`]
//! 7. Advance the high-water mark, only if the pieces were sent
//!
//! Steps 1 to 5 send nothing and change nothing when they fail.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::buffer::SampleBuffer;
use crate::channel::{ChannelKey, ChannelRegistry, ChannelRetriever};
use crate::config::WriterConfig;
use crate::error::{RemoteError, Result, StateError, ValidationError};
use crate::proto::{WRITER_ENDPOINT, WriterRequest, WriterResponse, decode_error};
use crate::segment::{Segment, TypedSegment};
use crate::split::split;
use crate::telem::TimeStamp;
use crate::transport::{MessageStream, StreamState, Transport};
use crate::validate::{ContiguityValidator, ScalarTypeValidator};

const NAME: &str = "Writer";

type WriterStream<T> = MessageStream<<T as Transport>::Stream, WriterRequest, WriterResponse>;

/// Untyped writer that sends raw segments for a fixed set of channels.
pub struct CoreWriter<T: Transport> {
    transport: T,
    stream: Option<WriterStream<T>>,
    state: StreamState,
    keys: Vec<ChannelKey>,
    failure: Option<RemoteError>,
}

impl<T: Transport> fmt::Debug for CoreWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreWriter")
            .field("state", &self.state)
            .field("keys", &self.keys)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> CoreWriter<T> {
    /// Creates an unopened writer.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            stream: None,
            state: StreamState::Unopened,
            keys: Vec::new(),
            failure: None,
        }
    }

    /// Opens a stream and locks `keys` for writing.
    ///
    /// # Errors
    ///
    /// - [`StateError::AlreadyOpen`] or [`StateError::Closed`] if the writer
    ///   is not fresh
    /// - [`StateError::OpenNotAcknowledged`] if the server answers negatively
    /// - the decoded [`crate::error::RemoteError`] if the server rejects the
    ///   keys, or any transport error
    pub async fn open(&mut self, keys: &[ChannelKey]) -> Result<()> {
        match self.state {
            StreamState::Unopened => {}
            StreamState::Closed => return Err(StateError::Closed(NAME).into()),
            StreamState::Open | StreamState::Failed => {
                return Err(StateError::AlreadyOpen(NAME).into());
            }
        }

        let mut stream: WriterStream<T> =
            MessageStream::new(self.transport.open_stream(WRITER_ENDPOINT).await?);
        // Until the open is acknowledged the stream is only good for closing.
        self.state = StreamState::Failed;
        debug!(channels = keys.len(), "opening writer");

        stream
            .send(&WriterRequest {
                open_keys: keys.iter().map(|k| k.value()).collect(),
                segments: Vec::new(),
            })
            .await?;
        let response = stream.receive().await;
        self.stream = Some(stream);
        let response = response?;

        if let Some(err) = decode_error(response.error.as_ref()) {
            warn!(error = %err, "writer open rejected");
            return Err(err.into());
        }
        if !response.ack {
            return Err(StateError::OpenNotAcknowledged(NAME).into());
        }

        self.keys = keys.to_vec();
        self.state = StreamState::Open;
        Ok(())
    }

    /// Sends `segments`.
    ///
    /// Returns `Ok(false)` without sending if the server has already
    /// responded, which means it has rejected an earlier write and is ending
    /// the stream. Call [`CoreWriter::close`] to retrieve the error.
    ///
    /// # Errors
    ///
    /// - [`StateError`] if the writer is not open
    /// - [`ValidationError`] on field `segments` if a segment targets a
    ///   channel the writer was not opened with; nothing is sent
    /// - any transport error raised while sending
    pub async fn write(&mut self, segments: Vec<Segment>) -> Result<bool> {
        self.state.ensure_open(NAME)?;
        let stream = self.stream.as_mut().ok_or(StateError::NotOpen(NAME))?;
        if self.failure.is_some() || stream.received() {
            debug!("writer stream holds a response; refusing write");
            return Ok(false);
        }

        let opened: HashSet<ChannelKey> = self.keys.iter().copied().collect();
        if let Some(segment) = segments.iter().find(|s| !opened.contains(&s.channel_key)) {
            return Err(ValidationError::new(
                "segments",
                format!(
                    "channel {} is not among the writer's open channels",
                    segment.channel_key
                ),
            )
            .into());
        }

        let request = WriterRequest {
            open_keys: Vec::new(),
            segments: segments.into_iter().map(Into::into).collect(),
        };
        if let Err(e) = stream.send(&request).await {
            warn!(error = %e, "writer send failed");
            self.state = StreamState::Failed;
            return Err(e);
        }
        Ok(true)
    }

    /// Half-closes the stream and waits for the server to finish.
    ///
    /// Closing an unopened or already closed writer does nothing.
    ///
    /// # Errors
    ///
    /// Returns the application error the server sent, typically the reason an
    /// earlier write was refused, or any transport error other than end of
    /// stream. The writer is closed either way.
    pub async fn close(&mut self) -> Result<()> {
        if matches!(self.state, StreamState::Unopened | StreamState::Closed) {
            return Ok(());
        }
        self.state = StreamState::Closed;
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if let Some(err) = self.failure.take() {
            warn!(error = %err, "writer closed with error");
            return Err(err.into());
        }

        stream.close_send()?;
        loop {
            match stream.receive().await {
                Ok(response) => {
                    if let Some(err) = decode_error(response.error.as_ref()) {
                        warn!(error = %err, "writer closed with error");
                        return Err(err.into());
                    }
                }
                Err(e) if e.is_eof() => break,
                Err(e) => return Err(e),
            }
        }
        debug!("writer closed");
        Ok(())
    }

    /// Returns the error the server has sent, if any, without closing.
    ///
    /// A response that is already waiting is consumed and its error kept, so
    /// later calls and [`CoreWriter::close`] report the same error. Returns
    /// `Ok(None)` when nothing has arrived.
    ///
    /// # Errors
    ///
    /// Returns any transport error other than end of stream raised while
    /// reading the waiting response.
    pub async fn error(&mut self) -> Result<Option<RemoteError>> {
        if self.failure.is_some() {
            return Ok(self.failure.clone());
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        if !stream.received() {
            return Ok(None);
        }
        match stream.receive().await {
            Ok(response) => self.failure = decode_error(response.error.as_ref()),
            Err(e) if e.is_eof() => {}
            Err(e) => return Err(e),
        }
        Ok(self.failure.clone())
    }

    /// Returns the channels the writer was opened with.
    pub fn keys(&self) -> &[ChannelKey] {
        &self.keys
    }

    /// Returns true if the writer accepts writes.
    pub fn is_open(&self) -> bool {
        self.state == StreamState::Open
    }

    fn ensure_open(&self) -> Result<()> {
        self.state.ensure_open(NAME)
    }
}

/// Writer that validates, splits and tracks contiguity of typed samples.
pub struct TypedWriter<T: Transport, R> {
    core: CoreWriter<T>,
    registry: Arc<ChannelRegistry<R>>,
    config: WriterConfig,
    contiguity: ContiguityValidator,
}

impl<T: Transport, R> fmt::Debug for TypedWriter<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedWriter")
            .field("core", &self.core)
            .field("config", &self.config)
            .field("contiguity", &self.contiguity)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, R: ChannelRetriever> TypedWriter<T, R> {
    /// Creates an unopened writer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError`] if `config` is invalid.
    pub fn new(
        transport: T,
        registry: Arc<ChannelRegistry<R>>,
        config: WriterConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: CoreWriter::new(transport),
            registry,
            config,
            contiguity: ContiguityValidator::new(config.contiguity),
        })
    }

    /// Resolves `keys` and opens the writer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::QueryError::ChannelsNotFound`] before opening
    /// anything if a channel does not exist, or any error from
    /// [`CoreWriter::open`].
    pub async fn open(&mut self, keys: &[ChannelKey]) -> Result<()> {
        self.registry.get_many(keys).await?;
        self.core.open(keys).await
    }

    /// Writes `samples` to channel `key` starting at `start`.
    ///
    /// Returns `Ok(false)` if the server has already refused an earlier
    /// write; see [`CoreWriter::write`]. The high-water mark only moves when
    /// this returns `Ok(true)`.
    ///
    /// # Errors
    ///
    /// - [`StateError`] if the writer is not open
    /// - [`crate::error::QueryError::ChannelsNotFound`] if the channel does not exist
    /// - [`ValidationError`] if the samples do not match the channel's data
    ///   type or the channel was not opened
    /// - [`crate::error::ContiguityError`] if the segment does not start at
    ///   the channel's high-water mark
    /// - any transport error raised while sending
    pub async fn write(
        &mut self,
        key: ChannelKey,
        start: TimeStamp,
        samples: &SampleBuffer,
    ) -> Result<bool> {
        self.core.ensure_open()?;

        let channel = self.registry.get(key).await?;
        ScalarTypeValidator::validate(samples, channel.data_type)?;
        let segment = TypedSegment::from_buffer(channel, start, samples)?;
        let mut end = self.contiguity.check(&segment)?;
        let pieces = split(segment, self.config.split_threshold)?;
        // The mark follows the data actually sent.
        if let Some(last) = pieces.last() {
            end = last.end()?;
        }

        let sent = self
            .core
            .write(pieces.into_iter().map(TypedSegment::into_segment).collect())
            .await?;
        if sent {
            self.contiguity.advance(key, end);
        }
        Ok(sent)
    }

    /// See [`CoreWriter::close`].
    ///
    /// # Errors
    ///
    /// See [`CoreWriter::close`].
    pub async fn close(&mut self) -> Result<()> {
        self.core.close().await
    }

    /// See [`CoreWriter::error`].
    ///
    /// # Errors
    ///
    /// See [`CoreWriter::error`].
    pub async fn error(&mut self) -> Result<Option<RemoteError>> {
        self.core.error().await
    }

    /// Returns the end of the last accepted write to `key`.
    pub fn high_water_mark(&self, key: ChannelKey) -> Option<TimeStamp> {
        self.contiguity.high_water_mark(key)
    }

    /// Returns the untyped writer.
    pub fn core(&self) -> &CoreWriter<T> {
        &self.core
    }

    /// Returns the writer's configuration.
    pub fn config(&self) -> WriterConfig {
        self.config
    }
}
