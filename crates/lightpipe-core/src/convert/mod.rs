//! The per-channel resampling primitive behind a narrow seam
//!
//! The orchestration loop treats resampling as opaque: construct per-job
//! converter state once per format epoch, then call `process` once per job
//! per block with the current conversion ratio and take back a variable
//! number of output frames. Three implementations sit behind the seam:
//!
//! - [`Quality::Bypass`] — the identity, for equal-rate bridging and tests
//! - [`Quality::Linear`] — fixed-point linear interpolation, cheap and
//!   deterministic, driven directly by the Q4.60 ratio
//! - [`Quality::Sinc`] — rubato's adjustable-ratio resampler for the quality
//!   path (enum wrapper because the rubato trait is not object safe)

mod linear;
mod sinc;

pub use linear::LinearConverter;
pub use sinc::SincConverter;

use crate::error::BridgeResult;
use crate::ratio::FsRatio;
use crate::types::{RateCode, Sample, MAX_OUT_FRAMES, N_IN_FRAMES};

/// Conversion quality selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// Pass samples through untouched; only valid when both domains run the
    /// same nominal rate
    Bypass,
    /// Fixed-point linear interpolation
    #[default]
    Linear,
    /// Polynomial/sinc resampling via rubato
    Sinc,
}

/// Epoch-scoped converter configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConverterConfig {
    pub input_rate: RateCode,
    pub output_rate: RateCode,
    pub quality: Quality,
    /// Dither the requantization back to 24 bits. Only meaningful for the
    /// sinc path; the fixed-point paths never leave integer samples.
    pub dither: bool,
}

impl ConverterConfig {
    /// The nominal conversion ratio for this rate pair, Q4.60.
    pub fn nominal_ratio(&self) -> FsRatio {
        FsRatio::from_rates(self.input_rate.hz(), self.output_rate.hz())
    }
}

/// One job's converter instance, carrying all cross-block state for its
/// channel slice. Owned exclusively by its worker slot for one epoch.
pub enum Converter {
    Bypass,
    Linear(LinearConverter),
    Sinc(Box<SincConverter>),
}

impl Converter {
    /// Build a converter for `channels` channels and return it with the
    /// nominal ratio the epoch's controller locks onto.
    pub fn new(config: &ConverterConfig, channels: usize) -> BridgeResult<(Self, FsRatio)> {
        let nominal = config.nominal_ratio();
        let converter = match config.quality {
            Quality::Bypass => {
                debug_assert_eq!(config.input_rate, config.output_rate);
                Converter::Bypass
            }
            Quality::Linear => Converter::Linear(LinearConverter::new(channels)),
            Quality::Sinc => Converter::Sinc(Box::new(SincConverter::new(
                config.input_rate,
                config.output_rate,
                channels,
                config.dither,
            )?)),
        };
        Ok((converter, nominal))
    }

    /// Convert one block. `input` holds `N_IN_FRAMES` interleaved frames of
    /// this job's channels; the produced frames land interleaved in `output`.
    /// Returns the output frame count, which varies with the ratio.
    pub fn process(
        &mut self,
        input: &[Sample],
        channels: usize,
        output: &mut [Sample],
        ratio: FsRatio,
    ) -> BridgeResult<usize> {
        debug_assert!(input.len() >= N_IN_FRAMES * channels);
        debug_assert!(output.len() >= MAX_OUT_FRAMES * channels);

        match self {
            Converter::Bypass => {
                output[..N_IN_FRAMES * channels].copy_from_slice(&input[..N_IN_FRAMES * channels]);
                Ok(N_IN_FRAMES)
            }
            Converter::Linear(linear) => Ok(linear.process(input, channels, output, ratio)),
            Converter::Sinc(sinc) => sinc.process(input, output, ratio),
        }
    }

    /// Sub-sample position of the next output sample within the input
    /// stream, Q32 fraction. Used to interpolate output timestamps; the
    /// sinc path does not expose its phase and reports zero.
    pub fn fractional_phase(&self) -> u64 {
        match self {
            Converter::Bypass => 0,
            Converter::Linear(linear) => linear.fractional_phase(),
            Converter::Sinc(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_is_identity() {
        let config = ConverterConfig {
            input_rate: RateCode::R48000,
            output_rate: RateCode::R48000,
            quality: Quality::Bypass,
            dither: false,
        };
        let (mut conv, nominal) = Converter::new(&config, 2).unwrap();
        assert_eq!(nominal, FsRatio::from_rates(48_000, 48_000));

        let input: Vec<Sample> = (0..(N_IN_FRAMES * 2) as i32).collect();
        let mut output = [0i32; MAX_OUT_FRAMES * 2];
        let frames = conv.process(&input, 2, &mut output, nominal).unwrap();

        assert_eq!(frames, N_IN_FRAMES);
        assert_eq!(&output[..N_IN_FRAMES * 2], &input[..]);
    }
}
