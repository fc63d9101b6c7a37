//! Null-sentinel encoding for fixed-width cells.
//!
//! | column type | width | absent encodes to |
//! |---|---|---|
//! | rank (u32) | 4 | `u32::MAX` |
//! | count (u64) | 8 | `0` |
//! | f64 | 8 | NaN |
//! | f32 | 4 | NaN |
//!
//! Non-finite floats from a source are treated as absent. A source rank of
//! `u32::MAX` or above, or below zero, is not representable and is rejected
//! at build time rather than encoded.

/// Rank value reserved for "no rank".
pub const RANK_SENTINEL: u32 = u32::MAX;

/// Convert a source rank to a storable one. `None` means the value is
/// outside the representable range (negative or colliding with the sentinel).
pub fn checked_rank(rank: i64) -> Option<u32> {
    if rank < 0 || rank >= RANK_SENTINEL as i64 {
        None
    } else {
        Some(rank as u32)
    }
}

pub fn encode_rank(rank: Option<u32>) -> u32 {
    rank.unwrap_or(RANK_SENTINEL)
}

pub fn decode_rank(raw: u32) -> Option<u32> {
    (raw != RANK_SENTINEL).then_some(raw)
}

pub fn encode_count(count: Option<u64>) -> u64 {
    count.unwrap_or(0)
}

pub fn encode_f64(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => f64::NAN,
    }
}

pub fn decode_f64(raw: f64) -> Option<f64> {
    (!raw.is_nan()).then_some(raw)
}

pub fn encode_f32(value: Option<f32>) -> f32 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => f32::NAN,
    }
}

pub fn decode_f32(raw: f32) -> Option<f32> {
    (!raw.is_nan()).then_some(raw)
}
