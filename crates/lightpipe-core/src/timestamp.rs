//! Output-timestamp interpolation
//!
//! The FIFO's control loop compares production and consumption timestamps,
//! so the timestamp attached to each produced block must refer to the exact
//! position of its first output sample, not just to the input block it was
//! converted from. The converter's fractional phase says how far between two
//! input frames that first output sample sits; scaling it by the input
//! domain's ticks-per-sample-period turns it into a reference-clock offset.

use crate::types::{RateCode, Timestamp};

/// Reference-clock ticks per input sample period for each rate pair,
/// indexed `[input][output]`. The effective period follows the multiplexed
/// wire rate, which is why the output rate participates: at double and quad
/// output rates the interpolation interval shortens accordingly.
const INTERPOLATION_TICKS: [[i32; 6]; 6] = [
    [2268, 2268, 2268, 2268, 2268, 2268],
    [2083, 2083, 2083, 2083, 2083, 2083],
    [2268, 2268, 1134, 1134, 1134, 1134],
    [2083, 2083, 1042, 1042, 1042, 1042],
    [2268, 2268, 1134, 1134, 567, 567],
    [2083, 2083, 1042, 1042, 521, 521],
];

/// Ticks per sample period in force for a rate pair.
pub fn interpolation_ticks(input: RateCode, output: RateCode) -> i32 {
    INTERPOLATION_TICKS[input.index()][output.index()]
}

/// Shift a block timestamp by the converter's Q32 fractional phase.
pub fn interpolate_timestamp(
    block_timestamp: Timestamp,
    phase_q32: u64,
    ticks_per_sample: i32,
) -> Timestamp {
    let correction = ((phase_q32 as i64 * ticks_per_sample as i64) >> 32) as i32;
    block_timestamp.wrapping_add(correction)
}
