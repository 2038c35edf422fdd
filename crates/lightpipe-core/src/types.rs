//! Common types and capacity constants for the conversion core
//!
//! Samples are 24-bit audio left-justified in `i32`, the width the optical
//! receiver delivers. Timestamps are wrapping ticks of the 100 MHz reference
//! clock shared by both domains' drivers.

use crate::error::ConfigError;

/// Audio sample: 24-bit value left-justified in an i32
pub type Sample = i32;

/// Wrapping 100 MHz reference-clock tick
pub type Timestamp = i32;

/// Reference-clock rate used for block timestamps (ticks per second)
pub const REF_CLOCK_HZ: u32 = 100_000_000;

/// Sample periods per input block handed to the converters.
/// Power of two, minimum 4 (the converter's decimation stages need it).
/// Lower improves latency and memory at the cost of per-block overhead.
pub const N_IN_FRAMES: usize = 4;

/// Total channels the bridge is sized for (one ADAT stream at base rate)
pub const MAX_CHANNELS: usize = 8;

/// Upper limit of parallel conversion jobs per block
pub const MAX_JOBS: usize = 4;

/// Channels one job may carry. Sizes the per-job converter state, so keep it
/// as small as the channel budget allows.
pub const MAX_CHANNELS_PER_JOB: usize = 4;

/// Worst-case output:input sample ratio per processing step (44.1 -> 192)
pub const OUT_IN_RATIO_MAX: usize = 5;

/// Output frames one block can produce at the worst-case ratio
pub const MAX_OUT_FRAMES: usize = OUT_IN_RATIO_MAX * N_IN_FRAMES;

/// The nominal sample rates both domains may run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum RateCode {
    R44100 = 0,
    R48000 = 1,
    R88200 = 2,
    R96000 = 3,
    R176400 = 4,
    R192000 = 5,
}

impl RateCode {
    /// All supported rates, low to high
    pub const ALL: [RateCode; 6] = [
        RateCode::R44100,
        RateCode::R48000,
        RateCode::R88200,
        RateCode::R96000,
        RateCode::R176400,
        RateCode::R192000,
    ];

    /// Map a nominal rate in Hz to its code. Anything else is a deployment
    /// misconfiguration, not a runtime condition.
    pub fn from_hz(hz: u32) -> Result<Self, ConfigError> {
        match hz {
            44_100 => Ok(RateCode::R44100),
            48_000 => Ok(RateCode::R48000),
            88_200 => Ok(RateCode::R88200),
            96_000 => Ok(RateCode::R96000),
            176_400 => Ok(RateCode::R176400),
            192_000 => Ok(RateCode::R192000),
            other => Err(ConfigError::UnsupportedRate(other)),
        }
    }

    /// Nominal rate in Hz
    pub fn hz(self) -> u32 {
        match self {
            RateCode::R44100 => 44_100,
            RateCode::R48000 => 48_000,
            RateCode::R88200 => 88_200,
            RateCode::R96000 => 96_000,
            RateCode::R176400 => 176_400,
            RateCode::R192000 => 192_000,
        }
    }

    /// Table index for rate-pair lookups
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One block of interleaved input samples for all active channels, frame
/// major: sample 0 of every channel, then sample 1, and so on. `timestamp`
/// is the reference-clock tick of the block's first frame, captured once per
/// block.
#[derive(Debug, Clone, Copy)]
pub struct InputBlock {
    pub samples: [Sample; N_IN_FRAMES * MAX_CHANNELS],
    pub timestamp: Timestamp,
}

impl InputBlock {
    pub fn silence() -> Self {
        Self {
            samples: [0; N_IN_FRAMES * MAX_CHANNELS],
            timestamp: 0,
        }
    }
}

impl Default for InputBlock {
    fn default() -> Self {
        Self::silence()
    }
}

/// Resampled output for one block: `frames` interleaved sample periods using
/// the same frame-major layout as the input.
#[derive(Debug, Clone, Copy)]
pub struct OutputBlock {
    pub samples: [Sample; MAX_OUT_FRAMES * MAX_CHANNELS],
    pub frames: usize,
}

impl OutputBlock {
    pub fn silence() -> Self {
        Self {
            samples: [0; MAX_OUT_FRAMES * MAX_CHANNELS],
            frames: 0,
        }
    }
}

impl Default for OutputBlock {
    fn default() -> Self {
        Self::silence()
    }
}

/// The format in force for one epoch: both domains' nominal rates plus the
/// active channel count (the optical side halves its channel count at double
/// rates, so the channel count is part of the format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochFormat {
    pub input_rate: u32,
    pub output_rate: u32,
    pub channel_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_codes_round_trip() {
        for code in RateCode::ALL {
            assert_eq!(RateCode::from_hz(code.hz()).unwrap(), code);
        }
    }

    #[test]
    fn odd_rate_is_a_config_error() {
        assert!(RateCode::from_hz(22_050).is_err());
        assert!(RateCode::from_hz(0).is_err());
    }
}
