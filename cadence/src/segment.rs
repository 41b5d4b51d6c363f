//! Segments: one channel's contiguous run of binary samples.
//!
//! A [`Segment`] is the raw unit carried on the wire: a channel key, a start
//! timestamp, and little-endian sample bytes. A [`TypedSegment`] pairs a
//! segment with its channel descriptor so its end, range and samples can be
//! derived. The end is never stored; it is always
//! `start + rate.byte_span(len(data), density)`.
//!
//! Extending a segment produces a new owned buffer. Segments held elsewhere
//! (for example in an iterator's accumulation buffer) are never mutated.

use std::sync::Arc;

use crate::buffer::SampleBuffer;
use crate::channel::{ChannelDescriptor, ChannelKey};
use crate::error::{ContiguityError, Result, ValidationError};
use crate::proto::SegmentPayload;
use crate::telem::{Size, TimeRange, TimeSpan, TimeStamp};

/// One channel's telemetry payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The channel the samples belong to.
    pub channel_key: ChannelKey,
    /// Timestamp of the first sample.
    pub start: TimeStamp,
    /// Little-endian sample bytes.
    pub data: Vec<u8>,
}

impl Segment {
    /// Creates a segment.
    pub fn new(channel_key: ChannelKey, start: TimeStamp, data: Vec<u8>) -> Self {
        Self {
            channel_key,
            start,
            data,
        }
    }

    /// Returns the payload size.
    pub fn size(&self) -> Size {
        Size::from(self.data.len())
    }
}

impl From<SegmentPayload> for Segment {
    fn from(p: SegmentPayload) -> Self {
        Segment::new(ChannelKey::new(p.channel_key), TimeStamp::new(p.start), p.data)
    }
}

impl From<Segment> for SegmentPayload {
    fn from(s: Segment) -> Self {
        SegmentPayload {
            channel_key: s.channel_key.value(),
            start: s.start.value(),
            data: s.data,
        }
    }
}

/// A segment resolved against its channel's descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedSegment {
    channel: Arc<ChannelDescriptor>,
    segment: Segment,
}

impl TypedSegment {
    /// Pairs a segment with its channel.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the segment belongs to a different
    /// channel, or its length is not a multiple of the channel's density.
    pub fn new(channel: Arc<ChannelDescriptor>, segment: Segment) -> Result<Self> {
        if segment.channel_key != channel.key {
            return Err(ValidationError::new(
                "channel_key",
                format!(
                    "segment for channel {} paired with channel {}",
                    segment.channel_key, channel.key
                ),
            )
            .into());
        }
        let density = u64::from(channel.density.value());
        if density != 0 && segment.size().value() % density != 0 {
            return Err(ValidationError::new(
                "data",
                format!(
                    "{} bytes is not a multiple of channel {} density {}",
                    segment.data.len(),
                    channel.key,
                    channel.density
                ),
            )
            .into());
        }
        Ok(Self { channel, segment })
    }

    /// Builds a segment from typed samples.
    ///
    /// The buffer is not checked against the channel's data type here; see
    /// [`crate::validate::ScalarTypeValidator`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the encoded length does not fit the
    /// channel's density.
    pub fn from_buffer(
        channel: Arc<ChannelDescriptor>,
        start: TimeStamp,
        buffer: &SampleBuffer,
    ) -> Result<Self> {
        let segment = Segment::new(channel.key, start, buffer.to_bytes());
        Self::new(channel, segment)
    }

    /// Returns the channel descriptor.
    pub fn channel(&self) -> &Arc<ChannelDescriptor> {
        &self.channel
    }

    /// Returns the raw segment.
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Consumes the typed segment and returns the raw segment.
    pub fn into_segment(self) -> Segment {
        self.segment
    }

    /// Returns the channel key.
    pub fn key(&self) -> ChannelKey {
        self.segment.channel_key
    }

    /// Returns the timestamp of the first sample.
    pub fn start(&self) -> TimeStamp {
        self.segment.start
    }

    /// Returns the raw sample bytes.
    pub fn data(&self) -> &[u8] {
        &self.segment.data
    }

    /// Returns the payload size.
    pub fn size(&self) -> Size {
        self.segment.size()
    }

    /// Returns the span covered by the samples.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::DomainError`] if the channel's rate is
    /// invalid or its density is unknown.
    pub fn span(&self) -> Result<TimeSpan> {
        self.channel
            .rate
            .byte_span(self.size(), self.channel.density)
    }

    /// Returns the exclusive end timestamp.
    ///
    /// # Errors
    ///
    /// See [`TypedSegment::span`].
    pub fn end(&self) -> Result<TimeStamp> {
        self.start().checked_add(self.span()?)
    }

    /// Returns the range `[start, end)`.
    ///
    /// # Errors
    ///
    /// See [`TypedSegment::span`].
    pub fn range(&self) -> Result<TimeRange> {
        Ok(TimeRange::new(self.start(), self.end()?))
    }

    /// Returns the number of samples.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::UnknownDensity`] if the density is unknown.
    pub fn sample_count(&self) -> Result<u64> {
        self.channel.density.sample_count(self.size())
    }

    /// Decodes the samples according to the channel's data type.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the bytes are not a whole number of samples.
    pub fn samples(&self) -> Result<SampleBuffer> {
        SampleBuffer::from_bytes(self.channel.data_type, &self.segment.data)
    }

    /// Returns true if `next` belongs to the same channel and starts exactly
    /// where this segment ends.
    ///
    /// # Errors
    ///
    /// See [`TypedSegment::span`].
    pub fn is_contiguous_with(&self, next: &TypedSegment) -> Result<bool> {
        Ok(self.key() == next.key() && self.end()? == next.start())
    }

    /// Returns a new segment holding this segment's samples followed by `next`'s.
    ///
    /// # Errors
    ///
    /// Returns [`ContiguityError::NotAdjacent`] if `next` does not start
    /// exactly at this segment's end, or belongs to another channel.
    pub fn extended(&self, next: &TypedSegment) -> Result<TypedSegment> {
        if !self.is_contiguous_with(next)? {
            return Err(ContiguityError::NotAdjacent {
                key: self.key(),
                end: self.end()?,
                start: next.start(),
            }
            .into());
        }
        let mut data = Vec::with_capacity(self.data().len() + next.data().len());
        data.extend_from_slice(self.data());
        data.extend_from_slice(next.data());
        Ok(TypedSegment {
            channel: Arc::clone(&self.channel),
            segment: Segment::new(self.key(), self.start(), data),
        })
    }
}

/// Merges contiguous segments of one channel into a single segment.
///
/// Returns `None` when `segments` is empty.
///
/// # Errors
///
/// Returns [`ContiguityError::NotAdjacent`] if any segment does not start where
/// the previous one ends.
pub fn merge<I>(segments: I) -> Result<Option<TypedSegment>>
where
    I: IntoIterator<Item = TypedSegment>,
{
    let mut merged: Option<TypedSegment> = None;
    for segment in segments {
        merged = Some(match merged {
            Some(acc) => acc.extended(&segment)?,
            None => segment,
        });
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CadenceError;
    use crate::telem::{DataType, Density, Rate};

    fn float_channel() -> Arc<ChannelDescriptor> {
        Arc::new(ChannelDescriptor::new(
            ChannelKey::new(1),
            "temp",
            1,
            Rate::hz(25.0),
            DataType::Float64,
        ))
    }

    fn second_of_samples(channel: &Arc<ChannelDescriptor>, start_s: i64) -> TypedSegment {
        let samples: Vec<f64> = (0..25).map(|i| f64::from(i) + start_s as f64).collect();
        TypedSegment::from_buffer(
            Arc::clone(channel),
            TimeStamp::seconds(start_s),
            &SampleBuffer::from(samples),
        )
        .unwrap()
    }

    #[test]
    fn test_end_is_derived_from_length() {
        let channel = float_channel();
        let seg = second_of_samples(&channel, 1);
        assert_eq!(seg.size(), Size::bytes(200));
        assert_eq!(seg.sample_count().unwrap(), 25);
        assert_eq!(seg.end().unwrap(), TimeStamp::seconds(2));
        assert_eq!(
            seg.range().unwrap(),
            TimeRange::new(TimeStamp::seconds(1), TimeStamp::seconds(2))
        );
    }

    #[test]
    fn test_extend_contiguous_segments() {
        let channel = float_channel();
        let first = second_of_samples(&channel, 1);
        let second = second_of_samples(&channel, 2);

        let merged = first.extended(&second).unwrap();
        assert_eq!(merged.start(), TimeStamp::seconds(1));
        assert_eq!(merged.end().unwrap(), TimeStamp::seconds(3));
        assert_eq!(merged.sample_count().unwrap(), 50);

        // The originals are untouched.
        assert_eq!(first.size(), Size::bytes(200));
        assert_eq!(second.size(), Size::bytes(200));
    }

    #[test]
    fn test_extend_rejects_gap() {
        let channel = float_channel();
        let first = second_of_samples(&channel, 1);
        let third = second_of_samples(&channel, 3);

        let err = first.extended(&third).unwrap_err();
        assert!(matches!(err, CadenceError::Contiguity(ContiguityError::NotAdjacent { .. })));
    }

    #[test]
    fn test_merge_many() {
        let channel = float_channel();
        let merged = merge((1..4).map(|s| second_of_samples(&channel, s)))
            .unwrap()
            .unwrap();
        assert_eq!(
            merged.range().unwrap(),
            TimeRange::new(TimeStamp::seconds(1), TimeStamp::seconds(4))
        );
        assert_eq!(merged.sample_count().unwrap(), 75);
        assert!(merge(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_new_rejects_partial_samples_and_wrong_channel() {
        let channel = float_channel();
        let partial = Segment::new(channel.key, TimeStamp::ZERO, vec![0; 12]);
        assert!(TypedSegment::new(Arc::clone(&channel), partial).is_err());

        let other = Segment::new(ChannelKey::new(9), TimeStamp::ZERO, vec![0; 8]);
        assert!(TypedSegment::new(channel, other).is_err());
    }

    #[test]
    fn test_unknown_density_has_no_end() {
        let mut descriptor = (*float_channel()).clone();
        descriptor.density = Density::UNKNOWN;
        let seg = TypedSegment::new(
            Arc::new(descriptor),
            Segment::new(ChannelKey::new(1), TimeStamp::ZERO, vec![0; 8]),
        )
        .unwrap();
        assert!(seg.end().is_err());
    }

    #[test]
    fn test_payload_conversion() {
        let seg = Segment::new(ChannelKey::new(4), TimeStamp::new(10), vec![1, 2]);
        let payload = SegmentPayload::from(seg.clone());
        assert_eq!(payload.channel_key, 4);
        assert_eq!(Segment::from(payload), seg);
    }
}
