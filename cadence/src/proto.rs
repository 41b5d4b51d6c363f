//! Wire messages for the iterator and writer streams.
//!
//! Hand-written prost types; no protoc or `.proto` files are involved. The
//! transport moves the encoded bytes and owns framing, so these messages are
//! the only wire contract the engines depend on.

use crate::error::RemoteError;
use crate::telem::TimeRange;

/// Endpoint that serves iterator streams.
pub const ITERATOR_ENDPOINT: &str = "/frame/iterate";

/// Endpoint that serves writer streams.
pub const WRITER_ENDPOINT: &str = "/frame/write";

/// Commands accepted by the iterator stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum IteratorCommand {
    /// Configure the iterator with keys and a range.
    Open = 0,
    /// Read forward by a span.
    Next = 1,
    /// Read backward by a span.
    Prev = 2,
    /// Move to the start of the range.
    SeekFirst = 3,
    /// Move to the end of the range.
    SeekLast = 4,
    /// Move to the last position at or before a stamp.
    SeekLe = 5,
    /// Move to the first position at or after a stamp.
    SeekGe = 6,
    /// Ask whether the iterator points at valid data.
    Valid = 7,
}

/// Kinds of iterator response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ResponseVariant {
    /// Not set.
    Unspecified = 0,
    /// Terminates a command and carries its boolean result.
    Ack = 1,
    /// Carries frames produced by the command in flight.
    Data = 2,
}

/// A half-open time range in nanoseconds.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct TimeRangePayload {
    /// Inclusive start.
    #[prost(int64, tag = "1")]
    pub start: i64,
    /// Exclusive end.
    #[prost(int64, tag = "2")]
    pub end: i64,
}

impl From<TimeRange> for TimeRangePayload {
    fn from(range: TimeRange) -> Self {
        Self {
            start: range.start.value(),
            end: range.end.value(),
        }
    }
}

/// One channel's sample bytes starting at a timestamp.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SegmentPayload {
    /// The channel key.
    #[prost(uint32, tag = "1")]
    pub channel_key: u32,
    /// Start timestamp in nanoseconds.
    #[prost(int64, tag = "2")]
    pub start: i64,
    /// Little-endian sample bytes.
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

/// An application error carried inside a response.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorPayload {
    /// Error kind tag (e.g. `validation`, `query`). Empty means no error.
    #[prost(string, tag = "1")]
    pub kind: String,
    /// Kind-specific data. JSON for `validation`, plain text otherwise.
    #[prost(string, tag = "2")]
    pub data: String,
}

/// A request on the iterator stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct IteratorRequest {
    /// The command to execute.
    #[prost(enumeration = "IteratorCommand", tag = "1")]
    pub command: i32,
    /// Step span for `Next` and `Prev`.
    #[prost(int64, tag = "2")]
    pub span: i64,
    /// Range for `Open`.
    #[prost(message, optional, tag = "3")]
    pub range: Option<TimeRangePayload>,
    /// Target stamp for `SeekLe` and `SeekGe`.
    #[prost(int64, tag = "4")]
    pub stamp: i64,
    /// Channel keys for `Open`.
    #[prost(uint32, repeated, tag = "5")]
    pub keys: Vec<u32>,
}

/// A response on the iterator stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct IteratorResponse {
    /// Whether this response acknowledges a command or carries data.
    #[prost(enumeration = "ResponseVariant", tag = "1")]
    pub variant: i32,
    /// Command result, meaningful when `variant` is `Ack`.
    #[prost(bool, tag = "2")]
    pub ack: bool,
    /// The command this response belongs to.
    #[prost(enumeration = "IteratorCommand", tag = "3")]
    pub command: i32,
    /// Application error, if any.
    #[prost(message, optional, tag = "4")]
    pub error: Option<ErrorPayload>,
    /// Frames, meaningful when `variant` is `Data`.
    #[prost(message, repeated, tag = "5")]
    pub segments: Vec<SegmentPayload>,
}

/// A request on the writer stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WriterRequest {
    /// Keys to lock; set only on the first request.
    #[prost(uint32, repeated, tag = "1")]
    pub open_keys: Vec<u32>,
    /// Segments to write.
    #[prost(message, repeated, tag = "2")]
    pub segments: Vec<SegmentPayload>,
}

/// A response on the writer stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WriterResponse {
    /// Whether the request was accepted.
    #[prost(bool, tag = "1")]
    pub ack: bool,
    /// Application error, if any.
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorPayload>,
}

/// Field-level detail in a `validation` error payload.
#[derive(Debug, serde::Deserialize)]
struct FieldPayload {
    field: String,
    message: String,
}

#[derive(Debug, serde::Deserialize)]
struct ValidationPayload {
    fields: Vec<FieldPayload>,
}

impl ErrorPayload {
    /// Creates an error payload.
    pub fn new(kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: data.into(),
        }
    }

    /// Decodes the payload into a [`RemoteError`], or `None` if it carries no error.
    pub fn remote_error(&self) -> Option<RemoteError> {
        match self.kind.as_str() {
            "" | "nil" => None,
            "validation" => Some(match serde_json::from_str::<ValidationPayload>(&self.data) {
                Ok(payload) => RemoteError::Validation {
                    fields: payload
                        .fields
                        .into_iter()
                        .map(|f| (f.field, f.message))
                        .collect(),
                },
                Err(_) => RemoteError::Validation {
                    fields: vec![(String::new(), self.data.clone())],
                },
            }),
            "query" => Some(RemoteError::Query(self.data.clone())),
            "contiguity" => Some(RemoteError::Contiguity(self.data.clone())),
            "unauthorized" => Some(RemoteError::Unauthorized(self.data.clone())),
            other => Some(RemoteError::Unknown {
                kind: other.to_string(),
                data: self.data.clone(),
            }),
        }
    }
}

/// Decodes an optional error payload into a [`RemoteError`].
pub fn decode_error(payload: Option<&ErrorPayload>) -> Option<RemoteError> {
    payload.and_then(ErrorPayload::remote_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_decode_validation_fields() {
        let payload = ErrorPayload::new(
            "validation",
            r#"{"fields":[{"field":"segments","message":"channel 4 is not open"}]}"#,
        );
        assert_eq!(
            payload.remote_error(),
            Some(RemoteError::Validation {
                fields: vec![("segments".to_string(), "channel 4 is not open".to_string())],
            })
        );
    }

    #[test]
    fn test_decode_known_and_unknown_kinds() {
        assert_eq!(ErrorPayload::new("", "").remote_error(), None);
        assert_eq!(ErrorPayload::new("nil", "").remote_error(), None);
        assert_eq!(
            ErrorPayload::new("unauthorized", "channel 1 is locked").remote_error(),
            Some(RemoteError::Unauthorized("channel 1 is locked".to_string()))
        );
        assert_eq!(
            ErrorPayload::new("sy.storage", "disk full").remote_error(),
            Some(RemoteError::Unknown {
                kind: "sy.storage".to_string(),
                data: "disk full".to_string(),
            })
        );
        assert_eq!(decode_error(None), None);
    }

    #[test]
    fn test_malformed_validation_payload_keeps_text() {
        let decoded = ErrorPayload::new("validation", "bad keys").remote_error();
        assert_eq!(
            decoded,
            Some(RemoteError::Validation {
                fields: vec![(String::new(), "bad keys".to_string())],
            })
        );
    }

    #[test]
    fn test_iterator_request_encoding() {
        let request = IteratorRequest {
            command: IteratorCommand::SeekGe as i32,
            stamp: 42,
            ..Default::default()
        };
        let decoded = IteratorRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.command(), IteratorCommand::SeekGe);
        assert_eq!(decoded.stamp, 42);
        assert!(decoded.range.is_none());
    }
}
