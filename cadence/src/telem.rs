//! Telemetry value types: timestamps, spans, ranges, rates, densities, data
//! types, and sizes.
//!
//! These are pure value objects. All time arithmetic is integer nanosecond
//! math; the only floating-point quantity is [`Rate`], and conversions from a
//! rate to a [`TimeSpan`] round to the nearest nanosecond.
//!
//! # Example
//!
//! ```rust
//! use cadence::telem::{Density, Rate, Size, TimeSpan, TimeStamp, TimeRange};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 32 bytes of 64-bit samples at 1 Hz covers four seconds.
//! let span = Rate::hz(1.0).byte_span(Size::bytes(32), Density::BIT64)?;
//! assert_eq!(span, TimeSpan::seconds(4));
//!
//! let range = TimeStamp::seconds(1).span_range(span);
//! assert_eq!(range, TimeRange::new(TimeStamp::seconds(1), TimeStamp::seconds(5)));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;

/// A nanosecond precision UTC timestamp.
///
/// Internally a signed 64-bit count of nanoseconds since the Unix epoch.
/// Ordering and arithmetic are plain integer operations. Arithmetic saturates
/// at [`TimeStamp::MIN`] and [`TimeStamp::MAX`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeStamp(i64);

impl TimeStamp {
    /// The minimum representable timestamp.
    pub const MIN: TimeStamp = TimeStamp(i64::MIN);
    /// The maximum representable timestamp.
    pub const MAX: TimeStamp = TimeStamp(i64::MAX);
    /// The Unix epoch.
    pub const ZERO: TimeStamp = TimeStamp(0);

    /// Creates a timestamp `ns` nanoseconds after the Unix epoch.
    pub const fn new(ns: i64) -> Self {
        Self(ns)
    }

    /// Returns a timestamp `v` nanoseconds after the epoch.
    pub const fn nanoseconds(v: i64) -> Self {
        Self(v)
    }

    /// Returns a timestamp `v` microseconds after the epoch.
    pub const fn microseconds(v: i64) -> Self {
        Self(v * NANOS_PER_MICRO)
    }

    /// Returns a timestamp `v` milliseconds after the epoch.
    pub const fn milliseconds(v: i64) -> Self {
        Self(v * NANOS_PER_MILLI)
    }

    /// Returns a timestamp `v` seconds after the epoch.
    pub const fn seconds(v: i64) -> Self {
        Self(v * NANOS_PER_SECOND)
    }

    /// Returns a timestamp `v` minutes after the epoch.
    pub const fn minutes(v: i64) -> Self {
        Self(v * NANOS_PER_MINUTE)
    }

    /// Returns the current wall-clock time.
    ///
    /// Clocks set before the epoch yield [`TimeStamp::ZERO`].
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(Self::ZERO, |d| Self::from(TimeSpan::from(d)))
    }

    /// Returns the raw nanosecond value.
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns true if this is the Unix epoch.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns the absolute duration between two timestamps.
    pub fn span(self, other: TimeStamp) -> TimeSpan {
        self.range(other).span()
    }

    /// Returns the range between two timestamps, ordered so it is valid.
    pub fn range(self, other: TimeStamp) -> TimeRange {
        TimeRange::new(self, other).make_valid()
    }

    /// Returns the range starting at this timestamp and spanning `span`.
    ///
    /// A negative span yields a range ending at this timestamp.
    pub fn span_range(self, span: TimeSpan) -> TimeRange {
        self.range(self + span)
    }

    /// Returns true if this timestamp is strictly after `other`.
    pub fn after(self, other: TimeStamp) -> bool {
        self > other
    }

    /// Returns true if this timestamp is after or equal to `other`.
    pub fn after_eq(self, other: TimeStamp) -> bool {
        self >= other
    }

    /// Returns true if this timestamp is strictly before `other`.
    pub fn before(self, other: TimeStamp) -> bool {
        self < other
    }

    /// Returns true if this timestamp is before or equal to `other`.
    pub fn before_eq(self, other: TimeStamp) -> bool {
        self <= other
    }

    /// Adds a span, reporting overflow as a [`DomainError`].
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Overflow`] if the result does not fit in 64 bits.
    pub fn checked_add(self, span: TimeSpan) -> Result<TimeStamp> {
        self.0
            .checked_add(span.0)
            .map(TimeStamp)
            .ok_or_else(|| DomainError::Overflow.into())
    }
}

impl From<i64> for TimeStamp {
    fn from(ns: i64) -> Self {
        Self(ns)
    }
}

impl From<TimeSpan> for TimeStamp {
    fn from(span: TimeSpan) -> Self {
        Self(span.0)
    }
}

impl Add<TimeSpan> for TimeStamp {
    type Output = TimeStamp;

    fn add(self, rhs: TimeSpan) -> TimeStamp {
        TimeStamp(self.0.saturating_add(rhs.0))
    }
}

impl Sub<TimeSpan> for TimeStamp {
    type Output = TimeStamp;

    fn sub(self, rhs: TimeSpan) -> TimeStamp {
        TimeStamp(self.0.saturating_sub(rhs.0))
    }
}

impl Sub<TimeStamp> for TimeStamp {
    type Output = TimeSpan;

    fn sub(self, rhs: TimeStamp) -> TimeSpan {
        TimeSpan(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A nanosecond precision duration.
///
/// Negative spans are valid and mean "in reverse", which the iterator uses for
/// backwards steps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeSpan(i64);

impl TimeSpan {
    /// The largest representable span.
    pub const MAX: TimeSpan = TimeSpan(i64::MAX);
    /// The smallest representable span.
    pub const MIN: TimeSpan = TimeSpan(i64::MIN);
    /// The zero span.
    pub const ZERO: TimeSpan = TimeSpan(0);

    /// Creates a span of `v` nanoseconds.
    pub const fn nanoseconds(v: i64) -> Self {
        Self(v)
    }

    /// Creates a span of `v` microseconds.
    pub const fn microseconds(v: i64) -> Self {
        Self(v * NANOS_PER_MICRO)
    }

    /// Creates a span of `v` milliseconds.
    pub const fn milliseconds(v: i64) -> Self {
        Self(v * NANOS_PER_MILLI)
    }

    /// Creates a span of `v` seconds.
    pub const fn seconds(v: i64) -> Self {
        Self(v * NANOS_PER_SECOND)
    }

    /// Creates a span of `v` minutes.
    pub const fn minutes(v: i64) -> Self {
        Self(v * NANOS_PER_MINUTE)
    }

    /// Creates a span of `v` hours.
    pub const fn hours(v: i64) -> Self {
        Self(v * NANOS_PER_HOUR)
    }

    /// Creates a span of `v` days.
    pub const fn days(v: i64) -> Self {
        Self(v * NANOS_PER_DAY)
    }

    /// Returns the raw nanosecond value.
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns true if the span is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns the span in (fractional) seconds.
    #[allow(clippy::cast_precision_loss)] // display and rate math only
    pub fn seconds_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND as f64
    }
}

impl From<i64> for TimeSpan {
    fn from(ns: i64) -> Self {
        Self(ns)
    }
}

impl From<Duration> for TimeSpan {
    fn from(d: Duration) -> Self {
        Self(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl Add for TimeSpan {
    type Output = TimeSpan;

    fn add(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan(self.0.saturating_add(rhs.0))
    }
}

impl Sub for TimeSpan {
    type Output = TimeSpan;

    fn sub(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for TimeSpan {
    type Output = TimeSpan;

    fn neg(self) -> TimeSpan {
        TimeSpan(self.0.saturating_neg())
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A half-open range of time `[start, end)`.
///
/// A range is valid when `start <= end`. Zero-span ranges are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start of the range.
    pub start: TimeStamp,
    /// Exclusive end of the range.
    pub end: TimeStamp,
}

impl TimeRange {
    /// The widest possible range.
    pub const MAX: TimeRange = TimeRange {
        start: TimeStamp::MIN,
        end: TimeStamp::MAX,
    };

    /// Creates a range from `start` to `end`. The range is not reordered.
    pub const fn new(start: TimeStamp, end: TimeStamp) -> Self {
        Self { start, end }
    }

    /// Returns the span occupied by the range. Negative if the range is invalid.
    pub fn span(&self) -> TimeSpan {
        self.end - self.start
    }

    /// Returns true if `start <= end`.
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Returns a valid range, swapping the endpoints if needed.
    #[must_use]
    pub fn make_valid(self) -> Self {
        if self.is_valid() { self } else { self.swap() }
    }

    /// Returns true if the range spans zero time.
    pub fn is_zero(&self) -> bool {
        self.start == self.end
    }

    /// Returns the range with its endpoints swapped.
    #[must_use]
    pub fn swap(self) -> Self {
        Self {
            start: self.end,
            end: self.start,
        }
    }

    /// Returns true if the stamp falls within `[start, end)`.
    pub fn contains(&self, stamp: TimeStamp) -> bool {
        stamp >= self.start && stamp < self.end
    }

    /// Returns true if the two ranges share any instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A sample rate in Hz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(f64);

impl Rate {
    /// Creates a rate of `v` samples per second.
    pub const fn hz(v: f64) -> Self {
        Self(v)
    }

    /// Creates a rate of `v` thousand samples per second.
    pub fn khz(v: f64) -> Self {
        Self(v * 1_000.0)
    }

    /// Returns the rate in Hz.
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Returns the rate as a divisor, rejecting zero, negative, and non-finite rates.
    fn divisor(self) -> Result<f64> {
        if self.0.is_finite() && self.0 > 0.0 {
            Ok(self.0)
        } else {
            Err(DomainError::InvalidRate(self.0).into())
        }
    }

    /// Returns the time between two consecutive samples.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidRate`] if the rate is not positive and finite.
    pub fn period(self) -> Result<TimeSpan> {
        self.span(1)
    }

    /// Returns the span covered by `sample_count` samples at this rate.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidRate`] if the rate is not positive and finite.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)] // rounded nanoseconds
    pub fn span(self, sample_count: u64) -> Result<TimeSpan> {
        let hz = self.divisor()?;
        let nanos = (sample_count as f64 * NANOS_PER_SECOND as f64 / hz).round();
        if nanos >= i64::MAX as f64 {
            return Err(DomainError::Overflow.into());
        }
        Ok(TimeSpan(nanos as i64))
    }

    /// Returns the span covered by `size` bytes of samples of the given density.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] if the rate is invalid or the density is unknown.
    pub fn byte_span(self, size: Size, density: Density) -> Result<TimeSpan> {
        self.span(density.sample_count(size)?)
    }

    /// Returns the (fractional) number of samples in `span` at this rate.
    pub fn sample_count(self, span: TimeSpan) -> f64 {
        span.seconds_f64() * self.0
    }

    /// Returns the number of bytes covering `span` at this rate and density.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownDensity`] if the density is unknown.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // whole samples only
    pub fn byte_count(self, span: TimeSpan, density: Density) -> Result<Size> {
        let samples = self.sample_count(span).max(0.0) as u64;
        density.size(samples)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz", self.0)
    }
}

/// The number of bytes occupied by one sample.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct Density(u32);

impl Density {
    /// An unknown density. Never valid in byte arithmetic.
    pub const UNKNOWN: Density = Density(0);
    /// One byte per sample.
    pub const BIT8: Density = Density(1);
    /// Two bytes per sample.
    pub const BIT16: Density = Density(2);
    /// Four bytes per sample.
    pub const BIT32: Density = Density(4);
    /// Eight bytes per sample.
    pub const BIT64: Density = Density(8);

    /// Returns the density in bytes per sample.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns true unless this is [`Density::UNKNOWN`].
    pub const fn is_known(self) -> bool {
        self.0 != 0
    }

    fn known(self) -> Result<u64> {
        if self.is_known() {
            Ok(u64::from(self.0))
        } else {
            Err(DomainError::UnknownDensity.into())
        }
    }

    /// Returns the number of whole samples in `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownDensity`] if the density is unknown.
    pub fn sample_count(self, size: Size) -> Result<u64> {
        Ok(size.value() / self.known()?)
    }

    /// Returns the number of bytes occupied by `samples` samples.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownDensity`] if the density is unknown.
    pub fn size(self, samples: u64) -> Result<Size> {
        Ok(Size::bytes(samples.saturating_mul(self.known()?)))
    }
}

impl TryFrom<u32> for Density {
    type Error = DomainError;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        match v {
            0 | 1 | 2 | 4 | 8 => Ok(Density(v)),
            other => Err(DomainError::InvalidDensity(other)),
        }
    }
}

impl From<Density> for u32 {
    fn from(d: Density) -> u32 {
        d.0
    }
}

impl fmt::Display for Density {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}B/sample", self.0)
        } else {
            f.write_str("unknown")
        }
    }
}

/// The in-memory representation of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `u8`
    U8,
    /// `u16`
    U16,
    /// `u32`
    U32,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `f64`
    F64,
}

/// The scalar kind of a channel's samples.
///
/// Serialized as its canonical lowercase tag (e.g. `"float64"`). Parsing an
/// unrecognized tag fails instead of falling back to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit IEEE float.
    Float64,
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit signed integer.
    Int32,
    /// 16-bit signed integer.
    Int16,
    /// 8-bit signed integer.
    Int8,
    /// 64-bit unsigned integer.
    Uint64,
    /// 32-bit unsigned integer.
    Uint32,
    /// 16-bit unsigned integer.
    Uint16,
    /// 8-bit unsigned integer.
    Uint8,
    /// Nanosecond timestamps, stored as 64-bit signed integers.
    #[serde(rename = "timestamp")]
    TimeStamp,
}

impl DataType {
    /// Every data type, in tag order.
    pub const ALL: [DataType; 11] = [
        DataType::Float64,
        DataType::Float32,
        DataType::Int64,
        DataType::Int32,
        DataType::Int16,
        DataType::Int8,
        DataType::Uint64,
        DataType::Uint32,
        DataType::Uint16,
        DataType::Uint8,
        DataType::TimeStamp,
    ];

    /// Returns the canonical string tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Float64 => "float64",
            DataType::Float32 => "float32",
            DataType::Int64 => "int64",
            DataType::Int32 => "int32",
            DataType::Int16 => "int16",
            DataType::Int8 => "int8",
            DataType::Uint64 => "uint64",
            DataType::Uint32 => "uint32",
            DataType::Uint16 => "uint16",
            DataType::Uint8 => "uint8",
            DataType::TimeStamp => "timestamp",
        }
    }

    /// Returns the in-memory element representation.
    pub const fn element(self) -> ElementKind {
        match self {
            DataType::Float64 => ElementKind::F64,
            DataType::Float32 => ElementKind::F32,
            DataType::Int64 | DataType::TimeStamp => ElementKind::I64,
            DataType::Int32 => ElementKind::I32,
            DataType::Int16 => ElementKind::I16,
            DataType::Int8 => ElementKind::I8,
            DataType::Uint64 => ElementKind::U64,
            DataType::Uint32 => ElementKind::U32,
            DataType::Uint16 => ElementKind::U16,
            DataType::Uint8 => ElementKind::U8,
        }
    }

    /// Returns the number of bytes per sample.
    pub const fn density(self) -> Density {
        match self {
            DataType::Float64
            | DataType::Int64
            | DataType::Uint64
            | DataType::TimeStamp => Density::BIT64,
            DataType::Float32 | DataType::Int32 | DataType::Uint32 => Density::BIT32,
            DataType::Int16 | DataType::Uint16 => Density::BIT16,
            DataType::Int8 | DataType::Uint8 => Density::BIT8,
        }
    }
}

impl FromStr for DataType {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|dt| dt.as_str() == s)
            .ok_or_else(|| DomainError::UnknownDataType(s.to_string()))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-negative number of bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Size(u64);

impl Size {
    /// One byte.
    pub const BYTE: Size = Size(1);
    /// One kilobyte (10^3 bytes).
    pub const KILOBYTE: Size = Size::kilobytes(1);
    /// One megabyte (10^6 bytes).
    pub const MEGABYTE: Size = Size::megabytes(1);
    /// One gigabyte (10^9 bytes).
    pub const GIGABYTE: Size = Size::gigabytes(1);
    /// One terabyte (10^12 bytes).
    pub const TERABYTE: Size = Size::terabytes(1);

    /// Creates a size of `v` bytes.
    pub const fn bytes(v: u64) -> Self {
        Self(v)
    }

    /// Creates a size of `v` kilobytes.
    pub const fn kilobytes(v: u64) -> Self {
        Self(v * 1_000)
    }

    /// Creates a size of `v` megabytes.
    pub const fn megabytes(v: u64) -> Self {
        Self(v * 1_000_000)
    }

    /// Creates a size of `v` gigabytes.
    pub const fn gigabytes(v: u64) -> Self {
        Self(v * 1_000_000_000)
    }

    /// Creates a size of `v` terabytes.
    pub const fn terabytes(v: u64) -> Self {
        Self(v * 1_000_000_000_000)
    }

    /// Returns the size in bytes.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns true if this size is strictly larger than `other`.
    pub fn larger_than(self, other: Size) -> bool {
        self > other
    }

    /// Returns true if this size is strictly smaller than `other`.
    pub fn smaller_than(self, other: Size) -> bool {
        self < other
    }
}

impl From<usize> for Size {
    fn from(v: usize) -> Self {
        Self(v as u64)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}
