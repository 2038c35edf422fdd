//! Bridge settings, optionally loaded from a YAML file

use anyhow::Context;
use serde::Deserialize;

use lightpipe_core::Quality;

/// Everything the simulated bridge needs to run. Any field may be omitted
/// from the file; missing fields take the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeSettings {
    /// Nominal input (optical) rate in Hz
    pub input_rate: u32,
    /// Nominal output (serial bus) rate in Hz
    pub output_rate: u32,
    pub channels: usize,
    pub max_jobs: usize,
    /// "bypass", "linear" or "sinc"
    pub quality: String,
    pub dither: bool,
    /// Simulated clock offset of the input domain, parts per million
    pub input_ppm: f64,
    /// Simulated clock offset of the output domain, parts per million
    pub output_ppm: f64,
    /// FIFO depth in frames
    pub fifo_frames: usize,
    /// How long the simulation runs
    pub run_seconds: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            input_rate: 48_000,
            output_rate: 48_000,
            channels: 8,
            max_jobs: 4,
            quality: "linear".to_string(),
            dither: false,
            input_ppm: 80.0,
            output_ppm: -50.0,
            fifo_frames: 100,
            run_seconds: 10,
        }
    }
}

impl BridgeSettings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {path}"))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {path}"))
    }

    pub fn quality(&self) -> anyhow::Result<Quality> {
        match self.quality.as_str() {
            "bypass" => Ok(Quality::Bypass),
            "linear" => Ok(Quality::Linear),
            "sinc" => Ok(Quality::Sinc),
            other => anyhow::bail!("unknown quality {other:?} (bypass, linear or sinc)"),
        }
    }

    /// Effective frame rate of a domain after its simulated ppm offset.
    pub fn effective_rate(nominal: u32, ppm: f64) -> f64 {
        nominal as f64 * (1.0 + ppm / 1e6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_and_validate() {
        let settings = BridgeSettings::default();
        assert!(settings.quality().is_ok());
    }

    #[test]
    fn yaml_overrides_defaults() {
        let settings: BridgeSettings =
            serde_yaml::from_str("input_rate: 44100\nquality: sinc\n").unwrap();
        assert_eq!(settings.input_rate, 44_100);
        assert_eq!(settings.output_rate, 48_000);
        assert!(matches!(settings.quality().unwrap(), Quality::Sinc));
    }

    #[test]
    fn unknown_quality_is_rejected() {
        let settings: BridgeSettings = serde_yaml::from_str("quality: best\n").unwrap();
        assert!(settings.quality().is_err());
    }

    #[test]
    fn ppm_offsets_shift_the_effective_rate() {
        let fast = BridgeSettings::effective_rate(48_000, 100.0);
        assert!(fast > 48_000.0 && fast < 48_010.0);
        let slow = BridgeSettings::effective_rate(48_000, -100.0);
        assert!(slow < 48_000.0 && slow > 47_990.0);
    }
}
