//! Iterator and writer configuration.
//!
//! Both configs are plain serde structs so they can be embedded in an
//! application's own configuration file. Unset fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::split::DEFAULT_SPLIT_THRESHOLD;
use crate::telem::Size;
use crate::validate::ContiguityConfig;

/// Configuration for a streaming iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IteratorConfig {
    /// Keep frames from every command instead of only the latest one.
    ///
    /// With aggregation on, the accumulated frames grow for the life of the
    /// iterator.
    pub aggregate: bool,
}

impl IteratorConfig {
    /// Sets aggregate mode.
    pub fn with_aggregate(mut self, aggregate: bool) -> Self {
        self.aggregate = aggregate;
        self
    }
}

/// Configuration for a typed writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Segments at or above this size are split before sending.
    pub split_threshold: Size,

    /// Contiguity policy applied to every written segment.
    ///
    /// `allow_no_high_water_mark` must stay set: the writer has no other way
    /// to establish a channel's first mark.
    pub contiguity: ContiguityConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            contiguity: ContiguityConfig::STRICT_WRITE,
        }
    }
}

impl WriterConfig {
    /// Sets the split threshold.
    pub fn with_split_threshold(mut self, threshold: Size) -> Self {
        self.split_threshold = threshold;
        self
    }

    /// Sets the contiguity policy.
    pub fn with_contiguity(mut self, contiguity: ContiguityConfig) -> Self {
        self.contiguity = contiguity;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroSplitThreshold`] if the split threshold is zero
    /// - [`ConfigError::NoHighWaterMarkBaseline`] if the contiguity policy
    ///   rejects a channel's first write
    pub fn validate(&self) -> Result<()> {
        if self.split_threshold.value() == 0 {
            return Err(ConfigError::ZeroSplitThreshold.into());
        }
        if !self.contiguity.allow_no_high_water_mark {
            return Err(ConfigError::NoHighWaterMarkBaseline.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CadenceError;

    #[test]
    fn test_writer_defaults() {
        let config = WriterConfig::default();
        assert_eq!(config.split_threshold, Size::megabytes(4));
        assert!(config.contiguity.allow_no_high_water_mark);
        assert!(!config.contiguity.allow_gaps);
        assert!(!config.contiguity.allow_overlap);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = WriterConfig::default().with_split_threshold(Size::bytes(0));
        assert!(matches!(
            config.validate(),
            Err(CadenceError::Config(ConfigError::ZeroSplitThreshold))
        ));
    }

    #[test]
    fn test_contiguity_without_baseline_rejected() {
        let config = WriterConfig::default().with_contiguity(ContiguityConfig::default());
        assert!(matches!(
            config.validate(),
            Err(CadenceError::Config(ConfigError::NoHighWaterMarkBaseline))
        ));

        let relaxed = ContiguityConfig::STRICT_WRITE.with_allow_gaps(true);
        assert!(WriterConfig::default().with_contiguity(relaxed).validate().is_ok());
    }

    #[test]
    fn test_json_partial_config() {
        let config: WriterConfig = serde_json::from_str(r#"{"split_threshold": 1024}"#).unwrap();
        assert_eq!(config.split_threshold, Size::bytes(1024));
        assert_eq!(config.contiguity, ContiguityConfig::STRICT_WRITE);

        let iter: IteratorConfig = serde_json::from_str("{}").unwrap();
        assert!(!iter.aggregate);

        let json = serde_json::to_string(&IteratorConfig::default().with_aggregate(true)).unwrap();
        assert_eq!(json, r#"{"aggregate":true}"#);
    }
}
