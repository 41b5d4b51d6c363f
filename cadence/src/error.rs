//! Error types for the cadence streaming client.

use thiserror::Error;

use crate::channel::ChannelKey;
use crate::telem::TimeStamp;

/// The main error type for all cadence operations.
///
/// Every failure inside the iterator and writer engines is surfaced to the
/// immediate caller through this enum. Nothing is retried internally.
#[derive(Error, Debug)]
pub enum CadenceError {
    /// Malformed or mismatched input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Time-ordering or adjacency violation between segments.
    #[error("contiguity error: {0}")]
    Contiguity(#[from] ContiguityError),

    /// A protocol or usage invariant was violated.
    #[error("unexpected state: {0}")]
    UnexpectedState(#[from] StateError),

    /// Illegal arithmetic on telemetry value types.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Channel metadata lookup failed.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Invalid iterator or writer configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Application error decoded from a stream response.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Error raised by the underlying stream transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Input failed validation before anything was sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    /// The offending field (e.g. `data`, `segments`).
    pub field: String,
    /// Description of the problem.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error for the given field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised when a segment is not adjacent to the previous one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContiguityError {
    /// The segment starts before the channel's high-water mark.
    #[error("segment for channel {key} starting at {start} overlaps high-water mark {mark}")]
    Overlap {
        /// The channel being written.
        key: ChannelKey,
        /// Start of the rejected segment.
        start: TimeStamp,
        /// The current high-water mark.
        mark: TimeStamp,
    },

    /// The segment does not start exactly at the channel's high-water mark.
    #[error("segment for channel {key} starting at {start} leaves a gap after high-water mark {mark}")]
    Gap {
        /// The channel being written.
        key: ChannelKey,
        /// Start of the rejected segment.
        start: TimeStamp,
        /// The current high-water mark.
        mark: TimeStamp,
    },

    /// Two segments passed to a merge are not adjacent.
    #[error("cannot extend segment for channel {key} ending at {end} with segment starting at {start}")]
    NotAdjacent {
        /// The channel of both segments.
        key: ChannelKey,
        /// End of the segment being extended.
        end: TimeStamp,
        /// Start of the segment being appended.
        start: TimeStamp,
    },
}

/// Errors raised when a method is called in the wrong state or the stream
/// breaks its protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A command was issued before `open`.
    #[error("{0}.open() must be called before any other method")]
    NotOpen(&'static str),

    /// A command was issued after `close`.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// A previous command failed and the stream must be closed.
    #[error("{0} failed on a previous command and must be closed")]
    Failed(&'static str),

    /// `open` was called twice.
    #[error("{0} is already open")]
    AlreadyOpen(&'static str),

    /// The server did not positively acknowledge the open request. This is a bug.
    #[error("{0} did not receive a positive acknowledgement on open")]
    OpenNotAcknowledged(&'static str),

    /// A response arrived that the protocol does not allow at this point.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The contiguity validator has no baseline for a channel.
    #[error("no high-water mark established for channel {0}")]
    NoHighWaterMark(ChannelKey),
}

/// Errors raised by illegal arithmetic on telemetry value types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// A rate of zero, a negative rate, or a non-finite rate was used as a divisor.
    #[error("invalid rate {0} Hz used in division")]
    InvalidRate(f64),

    /// The unknown density was used in byte arithmetic.
    #[error("unknown density used in byte arithmetic")]
    UnknownDensity,

    /// A string tag did not name any known data type.
    #[error("unknown data type '{0}'")]
    UnknownDataType(String),

    /// A numeric density did not match any known sample width.
    #[error("invalid density {0}")]
    InvalidDensity(u32),

    /// Timestamp or span arithmetic overflowed 64 bits.
    #[error("time arithmetic overflow")]
    Overflow,
}

/// Errors raised while resolving channel metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The metadata collaborator did not return these keys.
    #[error("channels not found: {0:?}")]
    ChannelsNotFound(Vec<ChannelKey>),
}

/// Errors raised when validating iterator or writer configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The split threshold must be at least one byte.
    #[error("split threshold must be greater than zero")]
    ZeroSplitThreshold,

    /// A writer's contiguity policy must let a channel's first write set its
    /// high-water mark.
    #[error("writer contiguity policy must allow writes without a high-water mark")]
    NoHighWaterMarkBaseline,
}

/// An application error decoded from a stream response's error payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The server rejected one or more request fields.
    #[error("remote validation failed: {fields:?}")]
    Validation {
        /// `(field, message)` pairs reported by the server.
        fields: Vec<(String, String)>,
    },

    /// The server could not satisfy a query.
    #[error("remote query failed: {0}")]
    Query(String),

    /// The server detected overlapping or non-contiguous writes.
    #[error("remote contiguity violation: {0}")]
    Contiguity(String),

    /// The requested channels are locked by another writer or not permitted.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An error kind this client does not recognize.
    #[error("{kind}: {data}")]
    Unknown {
        /// The raw error kind tag.
        kind: String,
        /// The raw error data.
        data: String,
    },
}

/// Errors raised by the stream transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The remote end closed the stream normally.
    #[error("end of stream")]
    Eof,

    /// The stream was closed locally and cannot carry more messages.
    #[error("stream closed")]
    Closed,

    /// A response could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The transport failed underneath the stream.
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns true if this is the end-of-stream signal.
    pub fn is_eof(&self) -> bool {
        matches!(self, TransportError::Eof)
    }
}

impl CadenceError {
    /// Returns true if this error wraps the transport end-of-stream signal.
    pub fn is_eof(&self) -> bool {
        matches!(self, CadenceError::Transport(TransportError::Eof))
    }
}

/// Type alias for `Result<T, CadenceError>`.
pub type Result<T> = std::result::Result<T, CadenceError>;
