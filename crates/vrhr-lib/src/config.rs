use crate::error::{PipelineError, Result};
use crate::units::bpm_to_hz;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_WINDOW_LENGTH_S: f64 = 20.0;
pub const DEFAULT_WINDOW_STRIDE_S: f64 = 2.0;
/// Stride used by the CSV batch tool.
pub const CSV_WINDOW_STRIDE_S: f64 = 5.0;
pub const DEFAULT_PEAK_DELTA: f64 = 0.02;
pub const DEFAULT_BAND_LOW_BPM: f64 = 60.0;
pub const DEFAULT_BAND_HIGH_BPM: f64 = 190.0;
/// Batches smaller than this are not analysed.
pub const DEFAULT_MIN_SAMPLES: usize = 20;

/// Tunable parameters of the heart-rate pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Length of each analysis window (seconds).
    pub window_length_s: f64,
    /// Offset between consecutive window starts (seconds).
    pub window_stride_s: f64,
    /// Minimum drop (spectrum magnitude units) that confirms a peak.
    pub peak_delta: f64,
    /// Exclusive lower bound of the plausible heart-rate band (BPM).
    pub band_low_bpm: f64,
    /// Exclusive upper bound of the plausible heart-rate band (BPM).
    pub band_high_bpm: f64,
    /// Minimum number of input samples before a batch is analysed.
    pub min_samples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_length_s: DEFAULT_WINDOW_LENGTH_S,
            window_stride_s: DEFAULT_WINDOW_STRIDE_S,
            peak_delta: DEFAULT_PEAK_DELTA,
            band_low_bpm: DEFAULT_BAND_LOW_BPM,
            band_high_bpm: DEFAULT_BAND_HIGH_BPM,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

impl PipelineConfig {
    pub fn band(&self) -> BpmBand {
        BpmBand {
            low_bpm: self.band_low_bpm,
            high_bpm: self.band_high_bpm,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("window_length_s", self.window_length_s),
            ("window_stride_s", self.window_stride_s),
            ("peak_delta", self.peak_delta),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        self.band().validate()
    }

    /// Defaults overlaid with the fields set in `text`.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let cfg = PipelineOverrides::from_toml_str(text)?.apply(Self::default());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_path(path: &Path) -> anyhow::Result<Self> {
        let cfg = PipelineOverrides::from_toml_path(path)?.apply(Self::default());
        cfg.validate().with_context(|| format!("in {}", path.display()))?;
        Ok(cfg)
    }
}

/// Pipeline fields set by a config file or command line; unset fields keep the base value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineOverrides {
    pub window_length_s: Option<f64>,
    pub window_stride_s: Option<f64>,
    pub peak_delta: Option<f64>,
    pub band_low_bpm: Option<f64>,
    pub band_high_bpm: Option<f64>,
    pub min_samples: Option<usize>,
}

impl PipelineOverrides {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("parsing pipeline config")
    }

    pub fn from_toml_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Fields set in `other` take precedence.
    pub fn merge(self, other: Self) -> Self {
        Self {
            window_length_s: other.window_length_s.or(self.window_length_s),
            window_stride_s: other.window_stride_s.or(self.window_stride_s),
            peak_delta: other.peak_delta.or(self.peak_delta),
            band_low_bpm: other.band_low_bpm.or(self.band_low_bpm),
            band_high_bpm: other.band_high_bpm.or(self.band_high_bpm),
            min_samples: other.min_samples.or(self.min_samples),
        }
    }

    pub fn apply(&self, base: PipelineConfig) -> PipelineConfig {
        PipelineConfig {
            window_length_s: self.window_length_s.unwrap_or(base.window_length_s),
            window_stride_s: self.window_stride_s.unwrap_or(base.window_stride_s),
            peak_delta: self.peak_delta.unwrap_or(base.peak_delta),
            band_low_bpm: self.band_low_bpm.unwrap_or(base.band_low_bpm),
            band_high_bpm: self.band_high_bpm.unwrap_or(base.band_high_bpm),
            min_samples: self.min_samples.unwrap_or(base.min_samples),
        }
    }
}

/// Open interval of plausible heart rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmBand {
    pub low_bpm: f64,
    pub high_bpm: f64,
}

impl Default for BpmBand {
    fn default() -> Self {
        Self {
            low_bpm: DEFAULT_BAND_LOW_BPM,
            high_bpm: DEFAULT_BAND_HIGH_BPM,
        }
    }
}

impl BpmBand {
    pub fn low_hz(&self) -> f64 {
        bpm_to_hz(self.low_bpm)
    }

    pub fn high_hz(&self) -> f64 {
        bpm_to_hz(self.high_bpm)
    }

    /// Strict containment; negative frequencies never match.
    pub fn contains_hz(&self, hz: f64) -> bool {
        self.low_hz() < hz && hz < self.high_hz()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.low_bpm.is_finite() && self.high_bpm.is_finite()) {
            return Err(PipelineError::InvalidConfig(
                "band bounds must be finite".into(),
            ));
        }
        if self.low_bpm < 0.0 || self.low_bpm >= self.high_bpm {
            return Err(PipelineError::InvalidConfig(format!(
                "band must satisfy 0 <= low < high, got {}..{}",
                self.low_bpm, self.high_bpm
            )));
        }
        Ok(())
    }
}
