//! Splitting oversized segments for transmission.
//!
//! A segment at or above the threshold is cut into pieces of at most the
//! threshold, rounded down to a whole number of samples. Every piece carries
//! its own start, so pieces are independently positioned and merging them in
//! order reproduces the input exactly.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::segment::{Segment, TypedSegment};
use crate::telem::Size;

/// Default maximum segment size sent in one write.
pub const DEFAULT_SPLIT_THRESHOLD: Size = Size::megabytes(4);

/// Splits `segment` into pieces no larger than `threshold`.
///
/// Segments smaller than the threshold are returned unchanged as a single
/// piece. Otherwise every piece but the last holds exactly
/// `threshold - threshold % density` bytes.
///
/// # Errors
///
/// - [`ValidationError`] if the segment must be split but its channel's
///   density is unknown, or the threshold is smaller than one sample
/// - [`crate::error::DomainError`] if a piece's start cannot be derived
///   from the channel's rate
pub fn split(segment: TypedSegment, threshold: Size) -> Result<Vec<TypedSegment>> {
    if segment.size().smaller_than(threshold) {
        return Ok(vec![segment]);
    }

    let channel = Arc::clone(segment.channel());
    let density = channel.density;
    if !density.is_known() {
        return Err(ValidationError::new(
            "data",
            format!(
                "cannot split segment for channel {} with unknown density",
                channel.key
            ),
        )
        .into());
    }

    let split_point = threshold.value() - threshold.value() % u64::from(density.value());
    if split_point == 0 {
        return Err(ValidationError::new(
            "split_threshold",
            format!("{threshold} is smaller than one {} sample", channel.data_type),
        )
        .into());
    }
    let chunk = usize::try_from(split_point).unwrap_or(usize::MAX);

    let original_size = segment.size();
    let Segment {
        channel_key,
        start,
        data,
    } = segment.into_segment();

    // Starts are derived from the byte offset into the original segment so
    // rounding never accumulates across pieces.
    let mut pieces = Vec::new();
    let mut offset = 0u64;
    for piece in data.chunks(chunk) {
        let elapsed = channel.rate.byte_span(Size::bytes(offset), density)?;
        let piece_start = start.checked_add(elapsed)?;
        pieces.push(TypedSegment::new(
            Arc::clone(&channel),
            Segment::new(channel_key, piece_start, piece.to_vec()),
        )?);
        offset += split_point;
    }

    debug!(
        channel = %channel_key,
        size = %original_size,
        %threshold,
        pieces = pieces.len(),
        "split oversized segment"
    );
    Ok(pieces)
}
