//! Pre-transmission validation of written segments.
//!
//! [`ContiguityValidator`] keeps a high-water mark per channel: the end of
//! the last segment accepted for it. A new segment must start exactly at the
//! mark unless the configuration allows overlaps or gaps. Validation never
//! mutates the table on failure.
//!
//! The validator is split into a pure [`ContiguityValidator::check`] and a
//! committing [`ContiguityValidator::advance`] so a writer can defer moving
//! the mark until the server has accepted the segment.
//!
//! [`ScalarTypeValidator`] rejects sample buffers whose element type does not
//! match the target channel.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::buffer::SampleBuffer;
use crate::channel::ChannelKey;
use crate::error::{ContiguityError, Result, StateError, ValidationError};
use crate::segment::TypedSegment;
use crate::telem::{DataType, TimeStamp};

/// Policy flags for [`ContiguityValidator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContiguityConfig {
    /// Accept the first segment of a channel that has no mark yet.
    pub allow_no_high_water_mark: bool,
    /// Accept segments starting before the mark.
    pub allow_overlap: bool,
    /// Accept segments starting anywhere other than the mark.
    pub allow_gaps: bool,
}

impl ContiguityConfig {
    /// The policy applied by writers: the first segment of a channel sets
    /// the baseline, and every later one must start exactly where the
    /// previous one ended.
    pub const STRICT_WRITE: ContiguityConfig = ContiguityConfig {
        allow_no_high_water_mark: true,
        allow_overlap: false,
        allow_gaps: false,
    };

    /// Sets whether a channel without a mark is accepted.
    pub fn with_allow_no_high_water_mark(mut self, allow: bool) -> Self {
        self.allow_no_high_water_mark = allow;
        self
    }

    /// Sets whether overlapping segments are accepted.
    pub fn with_allow_overlap(mut self, allow: bool) -> Self {
        self.allow_overlap = allow;
        self
    }

    /// Sets whether gaps are accepted.
    pub fn with_allow_gaps(mut self, allow: bool) -> Self {
        self.allow_gaps = allow;
        self
    }
}

/// Per-channel high-water-mark table.
#[derive(Debug, Clone, Default)]
pub struct ContiguityValidator {
    config: ContiguityConfig,
    marks: HashMap<ChannelKey, TimeStamp>,
}

impl ContiguityValidator {
    /// Creates a validator with an empty table.
    pub fn new(config: ContiguityConfig) -> Self {
        Self {
            config,
            marks: HashMap::new(),
        }
    }

    /// Returns the validator's policy.
    pub fn config(&self) -> ContiguityConfig {
        self.config
    }

    /// Checks `segment` against its channel's mark without changing it.
    ///
    /// Returns the segment's end, which is the mark to commit with
    /// [`ContiguityValidator::advance`] once the segment is accepted.
    ///
    /// # Errors
    ///
    /// - [`StateError::NoHighWaterMark`] if the channel has no mark and the
    ///   policy requires one
    /// - [`ContiguityError::Overlap`] if the segment starts before the mark
    /// - [`ContiguityError::Gap`] if the segment does not start at the mark
    /// - [`crate::error::DomainError`] if the segment's end cannot be derived
    pub fn check(&self, segment: &TypedSegment) -> Result<TimeStamp> {
        let key = segment.key();
        let start = segment.start();
        match self.marks.get(&key).copied() {
            None if !self.config.allow_no_high_water_mark => {
                return Err(StateError::NoHighWaterMark(key).into());
            }
            None => {}
            Some(mark) => {
                if !self.config.allow_overlap && start.before(mark) {
                    return Err(ContiguityError::Overlap { key, start, mark }.into());
                }
                if !self.config.allow_gaps && start != mark {
                    return Err(ContiguityError::Gap { key, start, mark }.into());
                }
            }
        }
        segment.end()
    }

    /// Moves the channel's mark to `end`. The mark never moves backward.
    pub fn advance(&mut self, key: ChannelKey, end: TimeStamp) {
        let mark = self.marks.entry(key).or_insert(end);
        if end.after(*mark) {
            *mark = end;
        }
        let mark = *mark;
        trace!(channel = %key, %mark, "advanced high-water mark");
    }

    /// Checks `segment` and, if it passes, advances its channel's mark.
    ///
    /// # Errors
    ///
    /// See [`ContiguityValidator::check`]. The table is unchanged on error.
    pub fn validate(&mut self, segment: &TypedSegment) -> Result<()> {
        let end = self.check(segment)?;
        self.advance(segment.key(), end);
        Ok(())
    }

    /// Returns the channel's current mark, if any.
    pub fn high_water_mark(&self, key: ChannelKey) -> Option<TimeStamp> {
        self.marks.get(&key).copied()
    }

    /// Forgets every mark.
    pub fn reset(&mut self) {
        self.marks.clear();
    }
}

/// Checks sample buffers against a channel's data type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarTypeValidator;

impl ScalarTypeValidator {
    /// Rejects `buffer` unless its element kind is the one `data_type` uses.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] on field `data` when the kinds differ.
    pub fn validate(buffer: &SampleBuffer, data_type: DataType) -> Result<()> {
        let expected = data_type.element();
        let actual = buffer.element();
        if actual == expected {
            Ok(())
        } else {
            Err(ValidationError::new(
                "data",
                format!("{actual:?} samples cannot be written to a {data_type} channel"),
            )
            .into())
        }
    }
}
