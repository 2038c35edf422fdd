//! Rubato-backed converter for the quality path
//!
//! Wraps an adjustable-ratio `FastFixedIn` fed fixed blocks of
//! `N_IN_FRAMES`. The conversion ratio is retrimmed every block from the
//! Q4.60 ratio the controller produces; rubato only accepts a bounded band
//! around the construction ratio, so the trim is clamped to stay inside it —
//! a wild transient error is narrowed here and washes out through the FIFO.
//!
//! Samples cross the seam as normalized f32 planes. Requantization back to
//! 24-bit integers optionally applies TPDF dither.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::{BridgeError, BridgeResult};
use crate::ratio::FsRatio;
use crate::types::{RateCode, Sample, N_IN_FRAMES};

/// Largest relative ratio excursion requested from rubato. Clock drift is
/// parts-per-million; the band is kept wide enough to swallow control
/// transients without tripping rubato's range check.
const RATIO_BAND: f64 = 0.08;

const I32_SCALE: f64 = 2_147_483_648.0;

pub struct SincConverter {
    resampler: FastFixedIn<f32>,
    channels: usize,
    /// Construction-time output/input ratio rubato's band is anchored to
    nominal_out_in: f64,
    input_planar: Vec<Vec<f32>>,
    output_planar: Vec<Vec<f32>>,
    dither: Option<Tpdf>,
}

impl SincConverter {
    pub fn new(
        input_rate: RateCode,
        output_rate: RateCode,
        channels: usize,
        dither: bool,
    ) -> BridgeResult<Self> {
        let nominal_out_in = output_rate.hz() as f64 / input_rate.hz() as f64;
        let resampler = FastFixedIn::new(
            nominal_out_in,
            1.0 + RATIO_BAND,
            PolynomialDegree::Cubic,
            N_IN_FRAMES,
            channels,
        )
        .map_err(|e| BridgeError::Convert(e.to_string()))?;

        let out_max = resampler.output_frames_max();
        Ok(Self {
            resampler,
            channels,
            nominal_out_in,
            input_planar: vec![vec![0.0; N_IN_FRAMES]; channels],
            output_planar: vec![vec![0.0; out_max]; channels],
            dither: dither.then(Tpdf::new),
        })
    }

    /// Convert one interleaved block; returns the output frame count.
    pub fn process(
        &mut self,
        input: &[Sample],
        output: &mut [Sample],
        ratio: FsRatio,
    ) -> BridgeResult<usize> {
        // Rubato accepts [nominal / (1 + band), nominal * (1 + band)]
        let target = (1.0 / ratio.to_f64()).clamp(
            self.nominal_out_in / (1.0 + RATIO_BAND),
            self.nominal_out_in * (1.0 + RATIO_BAND),
        );
        self.resampler
            .set_resample_ratio(target, false)
            .map_err(|e| BridgeError::Convert(e.to_string()))?;

        for (ch, plane) in self.input_planar.iter_mut().enumerate() {
            for (frame, slot) in plane.iter_mut().enumerate() {
                *slot = input[frame * self.channels + ch] as f32 / I32_SCALE as f32;
            }
        }

        let (_, out_frames) = self
            .resampler
            .process_into_buffer(&self.input_planar, &mut self.output_planar, None)
            .map_err(|e| BridgeError::Convert(e.to_string()))?;

        let frames = out_frames.min(output.len() / self.channels);
        for frame in 0..frames {
            for ch in 0..self.channels {
                let wide = self.output_planar[ch][frame] as f64 * I32_SCALE;
                output[frame * self.channels + ch] = match &mut self.dither {
                    Some(tpdf) => quantize_24(wide, tpdf.next()),
                    None => wide.clamp(i32::MIN as f64, i32::MAX as f64) as Sample,
                };
            }
        }
        Ok(frames)
    }
}

/// Triangular dither at one 24-bit LSB, from two uniform LCG draws.
struct Tpdf {
    state: u32,
}

impl Tpdf {
    fn new() -> Self {
        Self { state: 0x2545_F491 }
    }

    fn next(&mut self) -> i32 {
        let a = self.draw();
        let b = self.draw();
        a - b
    }

    fn draw(&mut self) -> i32 {
        self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        // Top 8 bits, scaled to half a 24-bit LSB (1 LSB == 128 here)
        ((self.state >> 24) & 0x7F) as i32
    }
}

/// Round to the nearest 24-bit step after adding dither; low 8 bits cleared.
fn quantize_24(wide: f64, dither: i32) -> Sample {
    let dithered = wide + dither as f64;
    let clamped = dithered.clamp(i32::MIN as f64, (i32::MAX - 0x7F) as f64);
    (clamped as i32 + 0x40) & !0x7F
}
