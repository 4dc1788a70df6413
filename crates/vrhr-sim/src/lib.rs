//! Synthetic headset recordings with a known heart rate.
use anyhow::{Context, Result};
use chrono::DateTime;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use vrhr_lib::io::motion_csv::write_motion_csv_path;
use vrhr_lib::signal::{channels, MotionKind, MotionSeries, Sample};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationSpec {
    pub name: String,
    pub duration_s: f64,
    pub sample_rate_hz: f64,
    pub heart_rate_bpm: f64,
    /// Peak cardiac acceleration per sample step.
    #[serde(default = "default_pulse_amplitude")]
    pub pulse_amplitude: f64,
    /// Constant acceleration bias along x; keeps the magnitude from rectifying the pulse.
    #[serde(default = "default_baseline")]
    pub baseline: f64,
    #[serde(default = "default_kind")]
    pub kind: MotionKind,
    #[serde(default = "default_start")]
    pub start_unix_s: i64,
    #[serde(default)]
    pub drift: Option<DriftSpec>,
    #[serde(default)]
    pub noise: Option<NoiseSpec>,
}

/// Slow sinusoidal head sway added to the acceleration.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct DriftSpec {
    pub amplitude: f64,
    pub period_s: f64,
}

/// Gaussian sensor noise added to every output channel.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct NoiseSpec {
    pub std: f64,
    #[serde(default)]
    pub seed: u64,
}

fn default_pulse_amplitude() -> f64 {
    0.3
}

fn default_baseline() -> f64 {
    2.0
}

fn default_kind() -> MotionKind {
    MotionKind::Velocity
}

fn default_start() -> i64 {
    1_725_000_000
}

impl SimulationSpec {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("duration_s", self.duration_s),
            ("sample_rate_hz", self.sample_rate_hz),
            ("heart_rate_bpm", self.heart_rate_bpm),
        ] {
            if !(value.is_finite() && value > 0.0) {
                anyhow::bail!("{name} must be positive, got {value}");
            }
        }
        if let Some(drift) = self.drift {
            if !(drift.period_s > 0.0) {
                anyhow::bail!("drift period must be positive, got {}", drift.period_s);
            }
        }
        if let Some(noise) = self.noise {
            if !(noise.std >= 0.0) {
                anyhow::bail!("noise std must be non-negative, got {}", noise.std);
            }
        }
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        (self.duration_s * self.sample_rate_hz).round() as usize + 1
    }

    fn acceleration(&self, t: f64) -> f64 {
        let pulse = self.pulse_amplitude * (2.0 * PI * self.heart_rate_bpm / 60.0 * t).sin();
        let sway = self
            .drift
            .map_or(0.0, |d| d.amplitude * (2.0 * PI * t / d.period_s).sin());
        self.baseline + pulse + sway
    }
}

pub fn read_spec(path: &Path) -> Result<SimulationSpec> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read simulation spec {}", path.display()))?;
    let spec: SimulationSpec = toml::from_str(&contents)
        .with_context(|| format!("parsing simulation spec {}", path.display()))?;
    spec.validate()?;
    Ok(spec)
}

/// Generate the recording described by `spec`.
///
/// Velocity is the running sum of the acceleration, position the running sum of velocity, so
/// first differences recover each level exactly before noise is added.
pub fn simulate(spec: &SimulationSpec) -> Result<MotionSeries> {
    spec.validate()?;
    let mut noise = match spec.noise {
        Some(n) if n.std > 0.0 => Some((
            Normal::new(0.0, n.std).context("noise distribution")?,
            StdRng::seed_from_u64(n.seed),
        )),
        _ => None,
    };
    let axes = match spec.kind {
        MotionKind::Velocity => channels::VELOCITY,
        MotionKind::Position => channels::POSITION,
    };
    let start_ms = spec.start_unix_s * 1000;

    let mut velocity = 0.0;
    let mut position = 0.0;
    let mut samples = Vec::with_capacity(spec.sample_count());
    for i in 0..spec.sample_count() {
        let offset_ms = (i as f64 * 1000.0 / spec.sample_rate_hz).round() as i64;
        let timestamp = DateTime::from_timestamp_millis(start_ms + offset_ms)
            .with_context(|| format!("sample {i} is out of the timestamp range"))?;
        let t = offset_ms as f64 / 1000.0;
        if i > 0 {
            velocity += spec.acceleration(t);
        }
        position += velocity;
        let x = match spec.kind {
            MotionKind::Velocity => velocity,
            MotionKind::Position => position,
        };
        let mut values = [x, 0.0, 0.0];
        if let Some((dist, rng)) = noise.as_mut() {
            for v in &mut values {
                *v += dist.sample(rng);
            }
        }
        let sample = axes
            .iter()
            .zip(values)
            .fold(Sample::new(timestamp), |s, (axis, v)| s.with(axis, v));
        samples.push(sample);
    }
    Ok(MotionSeries::new(spec.kind, samples))
}

/// Write the recording as a motion CSV readable by `vrhr estimate`.
pub fn write_recording(path: &Path, series: &MotionSeries) -> Result<()> {
    write_motion_csv_path(path, series)
}
