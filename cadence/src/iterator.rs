//! Streaming iterator over historical telemetry.
//!
//! An iterator holds one stream to the iterator endpoint and moves a
//! server-side cursor through a time range with positional commands. Each
//! command is sent once; the server answers with zero or more `Data`
//! responses carrying frames and exactly one `Ack` whose boolean is the
//! command's result.
//!
//! # Command Flow
//!
//! 1. Unless aggregation is on, clear the accumulated frames
//! 2. Send the request
//! 3. Read responses; `Data` frames are appended to the accumulation buffer
//! 4. The `Ack` ends the command and its boolean is returned
//!
//! Any error (transport, decode, or an application error in a response)
//! aborts the command and moves the iterator to a failed state in which
//! only [`CoreIterator::close`] is allowed. Nothing is retried.
//!
//! [`TypedIterator`] resolves frames against channel descriptors and merges
//! them per channel.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::channel::{ChannelKey, ChannelRegistry, ChannelRetriever};
use crate::config::IteratorConfig;
use crate::error::{Result, StateError};
use crate::proto::{
    ITERATOR_ENDPOINT, IteratorCommand, IteratorRequest, IteratorResponse, ResponseVariant,
    decode_error,
};
use crate::segment::{Segment, TypedSegment};
use crate::telem::{TimeRange, TimeSpan, TimeStamp};
use crate::transport::{MessageStream, StreamState, Transport};

/// Sentinel span that lets the server choose how far to step.
pub const AUTO_SPAN: TimeSpan = TimeSpan::nanoseconds(-1);

const NAME: &str = "Iterator";

type IteratorStream<T> =
    MessageStream<<T as Transport>::Stream, IteratorRequest, IteratorResponse>;

/// Untyped iterator that exchanges commands and raw frames.
pub struct CoreIterator<T: Transport> {
    transport: T,
    config: IteratorConfig,
    stream: Option<IteratorStream<T>>,
    state: StreamState,
    frames: Vec<Segment>,
}

impl<T: Transport> fmt::Debug for CoreIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreIterator")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("frames", &self.frames.len())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> CoreIterator<T> {
    /// Creates an unopened iterator.
    pub fn new(transport: T, config: IteratorConfig) -> Self {
        Self {
            transport,
            config,
            stream: None,
            state: StreamState::Unopened,
            frames: Vec::new(),
        }
    }

    /// Opens a stream and positions the iterator over `range` for `keys`.
    ///
    /// # Errors
    ///
    /// - [`StateError::AlreadyOpen`] or [`StateError::Closed`] if the
    ///   iterator is not fresh
    /// - [`StateError::OpenNotAcknowledged`] if the server answers the open
    ///   command negatively
    /// - any transport or remote error raised while opening
    pub async fn open(&mut self, range: TimeRange, keys: &[ChannelKey]) -> Result<()> {
        match self.state {
            StreamState::Unopened => {}
            StreamState::Closed => return Err(StateError::Closed(NAME).into()),
            StreamState::Open | StreamState::Failed => {
                return Err(StateError::AlreadyOpen(NAME).into());
            }
        }

        let stream = self.transport.open_stream(ITERATOR_ENDPOINT).await?;
        self.stream = Some(MessageStream::new(stream));
        self.state = StreamState::Open;
        debug!(channels = keys.len(), %range, "opening iterator");

        let request = IteratorRequest {
            command: IteratorCommand::Open as i32,
            range: Some(range.into()),
            keys: keys.iter().map(|k| k.value()).collect(),
            ..Default::default()
        };
        if !self.execute(request).await? {
            self.state = StreamState::Failed;
            return Err(StateError::OpenNotAcknowledged(NAME).into());
        }
        Ok(())
    }

    /// Reads forward by `span`, or by a server-chosen step with [`AUTO_SPAN`].
    ///
    /// Returns true if any data was read.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the iterator is not open, or any error
    /// raised while executing the command.
    pub async fn next(&mut self, span: TimeSpan) -> Result<bool> {
        self.execute(IteratorRequest {
            command: IteratorCommand::Next as i32,
            span: span.value(),
            ..Default::default()
        })
        .await
    }

    /// Reads backward by `span`, or by a server-chosen step with [`AUTO_SPAN`].
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn prev(&mut self, span: TimeSpan) -> Result<bool> {
        self.execute(IteratorRequest {
            command: IteratorCommand::Prev as i32,
            span: span.value(),
            ..Default::default()
        })
        .await
    }

    /// Moves to the start of the range.
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn seek_first(&mut self) -> Result<bool> {
        self.command(IteratorCommand::SeekFirst).await
    }

    /// Moves to the end of the range.
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn seek_last(&mut self) -> Result<bool> {
        self.command(IteratorCommand::SeekLast).await
    }

    /// Moves to the last position at or before `stamp`.
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn seek_le(&mut self, stamp: TimeStamp) -> Result<bool> {
        self.execute(IteratorRequest {
            command: IteratorCommand::SeekLe as i32,
            stamp: stamp.value(),
            ..Default::default()
        })
        .await
    }

    /// Moves to the first position at or after `stamp`.
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn seek_ge(&mut self, stamp: TimeStamp) -> Result<bool> {
        self.execute(IteratorRequest {
            command: IteratorCommand::SeekGe as i32,
            stamp: stamp.value(),
            ..Default::default()
        })
        .await
    }

    /// Returns true if the iterator points at valid data.
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn valid(&mut self) -> Result<bool> {
        self.command(IteratorCommand::Valid).await
    }

    /// Half-closes the stream and waits for the server to finish.
    ///
    /// Closing an unopened or already closed iterator does nothing.
    ///
    /// # Errors
    ///
    /// Returns the application error the server sent instead of ending the
    /// stream, or any transport error other than end of stream. The
    /// iterator is closed either way.
    pub async fn close(&mut self) -> Result<()> {
        if matches!(self.state, StreamState::Unopened | StreamState::Closed) {
            return Ok(());
        }
        self.state = StreamState::Closed;
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        stream.close_send()?;
        loop {
            match stream.receive().await {
                Ok(response) => {
                    if let Some(err) = decode_error(response.error.as_ref()) {
                        warn!(error = %err, "iterator closed with error");
                        return Err(err.into());
                    }
                }
                Err(e) if e.is_eof() => break,
                Err(e) => return Err(e),
            }
        }
        debug!("iterator closed");
        Ok(())
    }

    /// Returns the frames accumulated since the last reset, in arrival order.
    pub fn frames(&self) -> &[Segment] {
        &self.frames
    }

    /// Returns true if the iterator accepts commands.
    pub fn is_open(&self) -> bool {
        self.state == StreamState::Open
    }

    /// Returns the iterator's configuration.
    pub fn config(&self) -> IteratorConfig {
        self.config
    }

    async fn command(&mut self, command: IteratorCommand) -> Result<bool> {
        self.execute(IteratorRequest {
            command: command as i32,
            ..Default::default()
        })
        .await
    }

    async fn execute(&mut self, request: IteratorRequest) -> Result<bool> {
        self.state.ensure_open(NAME)?;
        if !self.config.aggregate {
            self.frames.clear();
        }
        let command = request.command();
        match self.exchange(request).await {
            Ok(ack) => {
                trace!(?command, ack, frames = self.frames.len(), "iterator command done");
                Ok(ack)
            }
            Err(e) => {
                warn!(?command, error = %e, "iterator command failed");
                self.state = StreamState::Failed;
                Err(e)
            }
        }
    }

    async fn exchange(&mut self, request: IteratorRequest) -> Result<bool> {
        let command = request.command();
        let stream = self.stream.as_mut().ok_or(StateError::NotOpen(NAME))?;
        stream.send(&request).await?;
        loop {
            let response = stream.receive().await?;
            if let Some(err) = decode_error(response.error.as_ref()) {
                return Err(err.into());
            }
            match response.variant() {
                ResponseVariant::Data => {
                    self.frames.extend(response.segments.into_iter().map(Segment::from));
                }
                ResponseVariant::Ack if response.command() == command => {
                    return Ok(response.ack);
                }
                ResponseVariant::Ack => {
                    return Err(StateError::UnexpectedResponse(format!(
                        "ack for {:?} while executing {:?}",
                        response.command(),
                        command
                    ))
                    .into());
                }
                ResponseVariant::Unspecified => {
                    return Err(StateError::UnexpectedResponse(
                        "response without a variant".to_string(),
                    )
                    .into());
                }
            }
        }
    }
}

/// Iterator that resolves frames against channel descriptors.
pub struct TypedIterator<T: Transport, R> {
    core: CoreIterator<T>,
    registry: Arc<ChannelRegistry<R>>,
}

impl<T: Transport, R: ChannelRetriever> TypedIterator<T, R> {
    /// Creates an unopened iterator.
    pub fn new(transport: T, registry: Arc<ChannelRegistry<R>>, config: IteratorConfig) -> Self {
        Self {
            core: CoreIterator::new(transport, config),
            registry,
        }
    }

    /// Resolves `keys` and opens the iterator over `range`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::QueryError::ChannelsNotFound`] before opening
    /// anything if a channel does not exist, or any error from
    /// [`CoreIterator::open`].
    pub async fn open(&mut self, range: TimeRange, keys: &[ChannelKey]) -> Result<()> {
        self.registry.get_many(keys).await?;
        self.core.open(range, keys).await
    }

    /// See [`CoreIterator::next`].
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn next(&mut self, span: TimeSpan) -> Result<bool> {
        self.core.next(span).await
    }

    /// See [`CoreIterator::prev`].
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn prev(&mut self, span: TimeSpan) -> Result<bool> {
        self.core.prev(span).await
    }

    /// See [`CoreIterator::seek_first`].
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn seek_first(&mut self) -> Result<bool> {
        self.core.seek_first().await
    }

    /// See [`CoreIterator::seek_last`].
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn seek_last(&mut self) -> Result<bool> {
        self.core.seek_last().await
    }

    /// See [`CoreIterator::seek_le`].
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn seek_le(&mut self, stamp: TimeStamp) -> Result<bool> {
        self.core.seek_le(stamp).await
    }

    /// See [`CoreIterator::seek_ge`].
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn seek_ge(&mut self, stamp: TimeStamp) -> Result<bool> {
        self.core.seek_ge(stamp).await
    }

    /// See [`CoreIterator::valid`].
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::next`].
    pub async fn valid(&mut self) -> Result<bool> {
        self.core.valid().await
    }

    /// See [`CoreIterator::close`].
    ///
    /// # Errors
    ///
    /// See [`CoreIterator::close`].
    pub async fn close(&mut self) -> Result<()> {
        self.core.close().await
    }

    /// Merges the accumulated frames into one segment per channel.
    ///
    /// Frames are ordered by start time and each channel's frames are joined
    /// end to start. Frames are copied; the accumulation buffer is unchanged.
    ///
    /// # Errors
    ///
    /// - [`crate::error::ContiguityError::NotAdjacent`] if two frames of a
    ///   channel are not contiguous
    /// - [`crate::error::QueryError::ChannelsNotFound`] if a frame names an
    ///   unknown channel
    /// - [`crate::error::ValidationError`] if a frame is not a whole number
    ///   of samples
    pub async fn value(&self) -> Result<BTreeMap<ChannelKey, TypedSegment>> {
        let mut frames = self.core.frames().to_vec();
        frames.sort_by_key(|f| f.start);

        let mut keys: Vec<ChannelKey> = frames.iter().map(|f| f.channel_key).collect();
        keys.sort_unstable();
        keys.dedup();
        let channels: BTreeMap<ChannelKey, _> = keys
            .iter()
            .copied()
            .zip(self.registry.get_many(&keys).await?)
            .collect();

        let mut merged = BTreeMap::new();
        for frame in frames {
            let channel = channels.get(&frame.channel_key).ok_or_else(|| {
                StateError::UnexpectedResponse(format!(
                    "frame for unresolved channel {}",
                    frame.channel_key
                ))
            })?;
            let typed = TypedSegment::new(Arc::clone(channel), frame)?;
            match merged.entry(typed.key()) {
                Entry::Vacant(slot) => {
                    slot.insert(typed);
                }
                Entry::Occupied(mut slot) => {
                    let extended = slot.get().extended(&typed)?;
                    slot.insert(extended);
                }
            }
        }
        Ok(merged)
    }

    /// Returns the untyped iterator.
    pub fn core(&self) -> &CoreIterator<T> {
        &self.core
    }
}
