//! # cadence
//!
//! Streaming iterator and writer client for clustered time-series telemetry.
//!
//! cadence is the client-side engine that reads and writes binary telemetry
//! segments over a bidirectional stream. It owns the protocol state machines,
//! the time arithmetic that positions every segment, per-channel contiguity
//! checks, and splitting of oversized writes. Connection setup and channel
//! metadata RPCs are left to the embedding application through the
//! [`Transport`] and [`ChannelRetriever`] traits.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Integer nanosecond time arithmetic; a segment's end is always derived
//!   from its rate, density and length, never stored
//! - Writes are type checked, contiguity checked and split before anything
//!   is sent
//! - A channel's high-water mark only moves after the write was sent
//! - One command in flight per stream, enforced by `&mut self`
//! - No retries and no background tasks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cadence::transport::duplex;
//! use cadence::{
//!     ChannelDescriptor, ChannelKey, ChannelRegistry, ChannelRetriever, DataType, Rate,
//!     SampleBuffer, TimeStamp, TypedWriter, WriterConfig,
//! };
//!
//! struct Static(Vec<ChannelDescriptor>);
//!
//! impl ChannelRetriever for Static {
//!     async fn retrieve(&self, keys: &[ChannelKey]) -> cadence::Result<Vec<ChannelDescriptor>> {
//!         Ok(self.0.iter().filter(|c| keys.contains(&c.key)).cloned().collect())
//!     }
//! }
//!
//! # async fn run() -> cadence::Result<()> {
//! let key = ChannelKey::new(1);
//! let registry = Arc::new(ChannelRegistry::new(Static(vec![ChannelDescriptor::new(
//!     key,
//!     "temperature",
//!     1,
//!     Rate::hz(25.0),
//!     DataType::Float64,
//! )])));
//!
//! // Any Transport works; the in-memory one needs a server on the listener.
//! let (transport, _listener) = duplex();
//! let mut writer = TypedWriter::new(transport, registry, WriterConfig::default())?;
//! writer.open(&[key]).await?;
//!
//! let samples = SampleBuffer::from(vec![20.5f64; 25]);
//! writer.write(key, TimeStamp::seconds(1), &samples).await?;
//! // The next write for this channel must start here.
//! assert_eq!(writer.high_water_mark(key), Some(TimeStamp::seconds(2)));
//!
//! writer.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`ChannelRegistry`]: Read-through cache of channel descriptors
//! - [`TypedIterator`]: Positional reads, merged per channel
//! - [`TypedWriter`]: Validated, split, contiguous writes
//! - [`CoreIterator`] / [`CoreWriter`]: The untyped stream state machines
//!
//! ## Modules
//!
//! - [`telem`]: Timestamps, spans, ranges, rates, densities, data types, sizes
//! - [`buffer`]: Typed sample buffers
//! - [`channel`]: Channel descriptors and the registry
//! - [`segment`]: Segments, end derivation and merging
//! - [`validate`]: Contiguity and scalar type validation
//! - [`split`]: Splitting oversized segments
//! - [`iterator`]: Streaming iterator
//! - [`writer`]: Streaming writer
//! - [`transport`]: Stream traits and the in-memory transport
//! - [`proto`]: Wire messages
//! - [`config`]: Iterator and writer configuration
//! - [`error`]: Error types

pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod iterator;
pub mod proto;
pub mod segment;
pub mod split;
pub mod telem;
pub mod transport;
pub mod validate;
pub mod writer;

// Re-export primary API types at crate root for convenience.
pub use buffer::SampleBuffer;
pub use channel::{ChannelDescriptor, ChannelKey, ChannelRegistry, ChannelRetriever};
pub use config::{IteratorConfig, WriterConfig};
pub use error::{CadenceError, Result};
pub use iterator::{AUTO_SPAN, CoreIterator, TypedIterator};
pub use segment::{Segment, TypedSegment};
pub use telem::{DataType, Density, Rate, Size, TimeRange, TimeSpan, TimeStamp};
pub use transport::{Stream, Transport};
pub use validate::{ContiguityConfig, ContiguityValidator, ScalarTypeValidator};
pub use writer::{CoreWriter, TypedWriter};
