//! Stream transport abstraction.
//!
//! The iterator and writer engines talk to the cluster through a
//! bidirectional stream of opaque frames. Establishing the connection
//! (handshake, TLS, auth) belongs to whoever implements [`Transport`]; the
//! engines only open a stream on an endpoint and exchange frames on it.
//!
//! [`MessageStream`] layers prost encoding over a raw [`Stream`] so the
//! engines deal in typed requests and responses.
//!
//! [`duplex`] builds an in-process transport over tokio channels. The client
//! half implements [`Transport`]; the [`Listener`] half accepts each opened
//! stream as a [`ServerStream`]. It is used by the tests and by embedders that
//! host a server in the same process.

use std::future::Future;
use std::io;
use std::marker::PhantomData;

use prost::Message;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::trace;

use crate::error::{Result, StateError, TransportError};

/// Frames buffered per direction before `send` waits.
pub const STREAM_CAPACITY: usize = 64;

/// Lifecycle of an iterator or writer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    Unopened,
    Open,
    Failed,
    Closed,
}

impl StreamState {
    /// Returns an error unless the state accepts commands.
    pub(crate) fn ensure_open(self, name: &'static str) -> Result<()> {
        match self {
            StreamState::Open => Ok(()),
            StreamState::Unopened => Err(StateError::NotOpen(name).into()),
            StreamState::Failed => Err(StateError::Failed(name).into()),
            StreamState::Closed => Err(StateError::Closed(name).into()),
        }
    }
}

/// A bidirectional stream of frames.
pub trait Stream: Send {
    /// Sends one frame.
    ///
    /// Fails with [`TransportError::Closed`] after [`Stream::close_send`] or
    /// once the remote end has gone away.
    fn send(&mut self, frame: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Receives the next frame.
    ///
    /// Fails with [`TransportError::Eof`] when the remote end has finished
    /// sending.
    fn receive(&mut self) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Half-closes the sending direction. The stream can still receive.
    fn close_send(&mut self) -> Result<()>;

    /// Returns true if a frame or the end of the stream is already waiting
    /// to be received. Never blocks.
    fn received(&mut self) -> bool;
}

/// Opens streams to the cluster.
pub trait Transport: Send + Sync {
    /// The stream type this transport produces.
    type Stream: Stream;

    /// Opens a new stream on `endpoint`.
    fn open_stream(&self, endpoint: &str) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// A [`Stream`] carrying prost-encoded `Req` and `Res` messages.
#[derive(Debug)]
pub struct MessageStream<S, Req, Res> {
    inner: S,
    _messages: PhantomData<fn(Req) -> Res>,
}

impl<S, Req, Res> MessageStream<S, Req, Res>
where
    S: Stream,
    Req: Message,
    Res: Message + Default,
{
    /// Wraps a raw stream.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _messages: PhantomData,
        }
    }

    /// Encodes and sends a request.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the stream cannot carry the frame.
    pub async fn send(&mut self, request: &Req) -> Result<()> {
        self.inner.send(request.encode_to_vec()).await
    }

    /// Receives and decodes the next response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Eof`] at end of stream and
    /// [`TransportError::Decode`] if the frame is not a valid response.
    pub async fn receive(&mut self) -> Result<Res> {
        let frame = self.inner.receive().await?;
        Ok(Res::decode(frame.as_slice()).map_err(TransportError::from)?)
    }

    /// Half-closes the sending direction.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying stream raised.
    pub fn close_send(&mut self) -> Result<()> {
        self.inner.close_send()
    }

    /// See [`Stream::received`].
    pub fn received(&mut self) -> bool {
        self.inner.received()
    }
}

/// Creates a connected in-memory transport and listener pair.
pub fn duplex() -> (DuplexTransport, Listener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DuplexTransport { connections: tx }, Listener { connections: rx })
}

/// Client half of an in-memory transport.
#[derive(Debug, Clone)]
pub struct DuplexTransport {
    connections: mpsc::UnboundedSender<ServerStream>,
}

impl Transport for DuplexTransport {
    type Stream = ClientStream;

    async fn open_stream(&self, endpoint: &str) -> Result<ClientStream> {
        let (request_tx, request_rx) = mpsc::channel(STREAM_CAPACITY);
        let (response_tx, response_rx) = mpsc::channel(STREAM_CAPACITY);

        let server = ServerStream {
            endpoint: endpoint.to_string(),
            requests: request_rx,
            responses: Some(response_tx),
        };
        self.connections.send(server).map_err(|_| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no listener for {endpoint}"),
            ))
        })?;

        trace!(endpoint, "opened in-memory stream");
        Ok(ClientStream {
            requests: Some(request_tx),
            responses: response_rx,
            pending: None,
        })
    }
}

/// Client end of an in-memory stream.
#[derive(Debug)]
pub struct ClientStream {
    requests: Option<mpsc::Sender<Vec<u8>>>,
    responses: mpsc::Receiver<Vec<u8>>,
    // A frame pulled off the channel by `received` and not yet handed out.
    pending: Option<Vec<u8>>,
}

impl Stream for ClientStream {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        let requests = self.requests.as_ref().ok_or(TransportError::Closed)?;
        requests
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        match self.responses.recv().await {
            Some(frame) => Ok(frame),
            None => Err(TransportError::Eof.into()),
        }
    }

    fn close_send(&mut self) -> Result<()> {
        self.requests = None;
        Ok(())
    }

    fn received(&mut self) -> bool {
        if self.pending.is_some() {
            return true;
        }
        match self.responses.try_recv() {
            Ok(frame) => {
                self.pending = Some(frame);
                true
            }
            Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }
}

/// Accepts streams opened through the paired [`DuplexTransport`].
#[derive(Debug)]
pub struct Listener {
    connections: mpsc::UnboundedReceiver<ServerStream>,
}

impl Listener {
    /// Waits for the next opened stream. Returns `None` once every
    /// transport handle has been dropped.
    pub async fn accept(&mut self) -> Option<ServerStream> {
        self.connections.recv().await
    }
}

/// Server end of an in-memory stream.
///
/// Dropping it, or calling [`ServerStream::finish`], ends the stream for the
/// client.
#[derive(Debug)]
pub struct ServerStream {
    endpoint: String,
    requests: mpsc::Receiver<Vec<u8>>,
    responses: Option<mpsc::Sender<Vec<u8>>>,
}

impl ServerStream {
    /// Returns the endpoint the client opened.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Receives and decodes the next request. Returns `Ok(None)` once the
    /// client has half-closed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if the frame is not a valid `M`.
    pub async fn receive<M: Message + Default>(&mut self) -> Result<Option<M>> {
        match self.requests.recv().await {
            Some(frame) => Ok(Some(
                M::decode(frame.as_slice()).map_err(TransportError::from)?,
            )),
            None => Ok(None),
        }
    }

    /// Encodes and sends a response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the stream was finished or the
    /// client has dropped its end.
    pub async fn send<M: Message>(&mut self, message: &M) -> Result<()> {
        let responses = self.responses.as_ref().ok_or(TransportError::Closed)?;
        responses
            .send(message.encode_to_vec())
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(())
    }

    /// Ends the response direction; the client sees end of stream.
    pub fn finish(&mut self) {
        self.responses = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{WriterRequest, WriterResponse};

    #[tokio::test]
    async fn test_duplex_exchange() {
        let (transport, mut listener) = duplex();
        let mut client: MessageStream<_, WriterRequest, WriterResponse> =
            MessageStream::new(transport.open_stream("/frame/write").await.unwrap());
        let mut server = listener.accept().await.unwrap();
        assert_eq!(server.endpoint(), "/frame/write");

        client
            .send(&WriterRequest {
                open_keys: vec![1, 2],
                segments: Vec::new(),
            })
            .await
            .unwrap();
        let request: WriterRequest = server.receive().await.unwrap().unwrap();
        assert_eq!(request.open_keys, vec![1, 2]);

        server
            .send(&WriterResponse {
                ack: true,
                error: None,
            })
            .await
            .unwrap();
        assert!(client.receive().await.unwrap().ack);
    }

    #[tokio::test]
    async fn test_close_send_and_eof() {
        let (transport, mut listener) = duplex();
        let mut client = transport.open_stream("/frame/iterate").await.unwrap();
        let mut server = listener.accept().await.unwrap();

        client.close_send().unwrap();
        assert!(client.send(vec![1]).await.is_err());
        assert!(server.receive::<WriterRequest>().await.unwrap().is_none());

        assert!(!client.received());
        server.finish();
        assert!(client.received());
        assert!(client.receive().await.unwrap_err().is_eof());
    }

    #[tokio::test]
    async fn test_received_keeps_frame() {
        let (transport, mut listener) = duplex();
        let mut client: MessageStream<_, WriterRequest, WriterResponse> =
            MessageStream::new(transport.open_stream("/frame/write").await.unwrap());
        let mut server = listener.accept().await.unwrap();

        server
            .send(&WriterResponse {
                ack: false,
                error: None,
            })
            .await
            .unwrap();
        assert!(client.received());
        assert!(client.received());
        assert!(!client.receive().await.unwrap().ack);
    }

    #[tokio::test]
    async fn test_open_without_listener_fails() {
        let (transport, listener) = duplex();
        drop(listener);
        assert!(transport.open_stream("/frame/write").await.is_err());
    }
}
