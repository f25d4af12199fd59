//! Position arithmetic.
//!
//! Logical stream positions are `u64` but bounded by [`MAX_POSITION`] so they
//! stay exchangeable with OS-level signed 64-bit offsets. All conversions
//! between positions and in-memory lengths saturate instead of wrapping.

/// Highest representable logical stream position.
pub const MAX_POSITION: u64 = i64::MAX as u64;

/// Converts a position or distance to a length, saturating on 32-bit
/// targets.
#[inline]
pub(crate) fn to_length(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
