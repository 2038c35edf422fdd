//! Conversion-ratio representation and feedback controller
//!
//! The converters consume the input:output frequency ratio as unsigned Q4.60
//! fixed point. Once per epoch the controller rounds the nominal ratio down
//! to Q4.28 (`ideal`); once per block it scales `ideal` by the FIFO's signed
//! Q32 timing error:
//!
//! ```text
//! ratio = (ideal << 32) + error * ideal        // == ideal * (2^32 + error)
//! ```
//!
//! Proportional correction only. The integral action lives inside the FIFO's
//! own depth servo, whose output this controller merely scales, so a grossly
//! wrong transient error produces one grossly wrong block and then washes out.

/// Input-rate : output-rate conversion factor, unsigned Q4.60.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsRatio(pub u64);

impl FsRatio {
    /// Nominal ratio for a rate pair.
    pub fn from_rates(input_hz: u32, output_hz: u32) -> Self {
        debug_assert!(output_hz > 0);
        Self((((input_hz as u128) << 60) / output_hz as u128) as u64)
    }

    /// Per-output-sample phase step in Q32.32 input-frame units.
    pub fn phase_step_q32(self) -> u64 {
        self.0 >> 28
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1u64 << 60) as f64
    }
}

/// Per-epoch proportional controller keeping the conversion ratio locked to
/// the true rate difference between the domains.
#[derive(Debug, Clone, Copy)]
pub struct RatioController {
    /// Nominal ratio rounded to Q4.28, fixed for the epoch
    ideal: i32,
}

impl RatioController {
    /// Capture the epoch's ideal ratio from the converter's nominal ratio.
    /// Computed exactly once per epoch; a FIFO reset mid-epoch produces a
    /// transient error, not a new ideal.
    pub fn new(nominal: FsRatio) -> Self {
        Self {
            ideal: ((nominal.0 + (1 << 31)) >> 32) as i32,
        }
    }

    /// The epoch's Q4.28 ideal ratio.
    pub fn ideal(&self) -> i32 {
        self.ideal
    }

    /// The ratio with zero correction applied.
    pub fn nominal(&self) -> FsRatio {
        FsRatio((self.ideal as u64) << 32)
    }

    /// Apply the timing error reported by the most recent FIFO production.
    /// Carried in 64-bit; deliberately unsaturated, so a wild error (a queue
    /// reset, say) yields one wild block and self-corrects.
    pub fn update(&self, error: i32) -> FsRatio {
        let ratio = ((self.ideal as i64) << 32) + (error as i64) * (self.ideal as i64);
        FsRatio(ratio as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q60_UNITY: u64 = 1 << 60;

    #[test]
    fn unity_rates_give_unity_ratio() {
        let nominal = FsRatio::from_rates(48_000, 48_000);
        assert_eq!(nominal.0, Q60_UNITY);

        let ctl = RatioController::new(nominal);
        assert_eq!(ctl.ideal(), 1 << 28);
        assert_eq!(ctl.update(0), nominal);
    }

    #[test]
    fn ratio_scales_with_rate_pair() {
        let down = FsRatio::from_rates(96_000, 48_000);
        assert_eq!(down.0, 2 * Q60_UNITY);

        let up = FsRatio::from_rates(48_000, 96_000);
        assert_eq!(up.0, Q60_UNITY / 2);
    }

    #[test]
    fn error_term_is_relative() {
        let ctl = RatioController::new(FsRatio::from_rates(48_000, 48_000));

        // +2^31 error means +50% rate: 1.5 in Q4.60
        let stretched = ctl.update(i32::MAX);
        let relative = stretched.to_f64();
        assert!((relative - 1.5).abs() < 1e-6, "got {relative}");

        let shrunk = ctl.update(-(1 << 30));
        assert!((shrunk.to_f64() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn zero_mean_errors_keep_nominal_rate_on_average() {
        let ctl = RatioController::new(FsRatio::from_rates(44_100, 48_000));
        let errors = [40_000i32, -40_000, 25_000, -25_000, 0, 15_000, -15_000];

        let mean: f64 = errors
            .iter()
            .cycle()
            .take(7 * 1000)
            .map(|&e| ctl.update(e).to_f64())
            .sum::<f64>()
            / 7000.0;

        let nominal = ctl.nominal().to_f64();
        assert!((mean - nominal).abs() / nominal < 1e-9);
    }

    #[test]
    fn transient_error_does_not_stick() {
        let ctl = RatioController::new(FsRatio::from_rates(48_000, 44_100));
        let nominal = ctl.nominal();

        // One wild block (queue reset), then steady state again: the
        // correction is purely proportional, so recovery is immediate
        let wild = ctl.update(i32::MIN);
        assert_ne!(wild, nominal);
        assert_eq!(ctl.update(0), nominal);
    }
}
