use crate::{
    config::{BpmBand, PipelineConfig},
    detectors::peaks::{peakdet, Peak, PeakSet},
    error::{PipelineError, Result},
    metrics::hrv::{nn_summary, remove_outliers_iqr, NnSummary},
    signal::{chop, channels, difference, with_magnitude, MotionSeries, Sample, Window},
    spectrum::Spectrum,
    units::hz_to_bpm,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Heart rate of one window. `bpm == 0.0` means no confident estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateEstimate {
    pub timestamp: DateTime<Utc>,
    pub bpm: f64,
}

impl HeartRateEstimate {
    pub fn is_confident(&self) -> bool {
        self.bpm > 0.0
    }
}

/// Intermediate products of one window, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowAnalysis {
    pub spectrum: Spectrum,
    pub peaks: PeakSet,
    pub selected: Option<Peak>,
    pub bpm: f64,
}

/// Largest in-band maximum; the first one wins ties. Peak positions are in Hz.
pub fn select_peak<'p>(maxima: &'p [Peak], band: &BpmBand) -> Option<&'p Peak> {
    maxima
        .iter()
        .filter(|p| band.contains_hz(p.position))
        .fold(None, |best: Option<&Peak>, p| match best {
            Some(b) if b.value >= p.value => Some(b),
            _ => Some(p),
        })
}

/// BPM of the dominant in-band peak, or `0.0` when none survives the band filter.
pub fn bpm_from_peaks(maxima: &[Peak], band: &BpmBand) -> f64 {
    select_peak(maxima, band).map_or(0.0, |p| hz_to_bpm(p.position))
}

/// Spectrum → peaks → BPM over one scalar channel of `samples`.
pub fn analyze_channel(
    samples: &[Sample],
    channel: &str,
    cfg: &PipelineConfig,
) -> Result<WindowAnalysis> {
    let spectrum = Spectrum::from_window(samples, |s| s.value(channel))?;
    let peaks = peakdet(&spectrum.magnitudes, cfg.peak_delta, Some(&spectrum.frequencies))?;
    let band = cfg.band();
    let selected = select_peak(&peaks.maxima, &band).copied();
    let bpm = bpm_from_peaks(&peaks.maxima, &band);
    Ok(WindowAnalysis {
        spectrum,
        peaks,
        selected,
        bpm,
    })
}

/// Acceleration magnitude samples (`LinAcc`) from velocity samples; one shorter than the input.
pub fn acceleration_magnitude(velocity: &[Sample]) -> Result<Vec<Sample>> {
    difference(velocity, &channels::VELOCITY_TO_ACCELERATION, true)
        .map(|s| s.and_then(|s| with_magnitude(&s, channels::ACCELERATION, channels::LIN_ACC)))
        .collect()
}

/// Full per-window analysis of velocity samples.
pub fn analyze_window(velocity: &[Sample], cfg: &PipelineConfig) -> Result<WindowAnalysis> {
    let acceleration = acceleration_magnitude(velocity)?;
    analyze_channel(&acceleration, channels::LIN_ACC, cfg)
}

/// Heart-rate estimate of one window of velocity samples.
pub fn estimate_window(window: &Window<'_>, cfg: &PipelineConfig) -> Result<HeartRateEstimate> {
    let timestamp = window_timestamp(window)?;
    let analysis = analyze_window(window.samples, cfg)?;
    Ok(HeartRateEstimate {
        timestamp,
        bpm: analysis.bpm,
    })
}

fn window_timestamp(window: &Window<'_>) -> Result<DateTime<Utc>> {
    window
        .timestamp()
        .ok_or(PipelineError::TimestampOutOfRange(window.start_s))
}

/// Estimates for every window of a batch plus the batch variability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRatePipelineResult {
    pub sample_count: usize,
    pub estimates: Vec<HeartRateEstimate>,
    /// `None` when no window produced a non-zero estimate.
    pub hrv: Option<NnSummary>,
}

impl HeartRatePipelineResult {
    pub fn from_estimates(sample_count: usize, estimates: Vec<HeartRateEstimate>) -> Self {
        let bpm: Vec<f64> = estimates.iter().map(|e| e.bpm).collect();
        let hrv = nn_summary(&bpm);
        Self {
            sample_count,
            estimates,
            hrv,
        }
    }

    pub fn empty(sample_count: usize) -> Self {
        Self::from_estimates(sample_count, Vec::new())
    }

    pub fn confident(&self) -> impl Iterator<Item = &HeartRateEstimate> + '_ {
        self.estimates.iter().filter(|e| e.is_confident())
    }

    pub fn sdnn_s(&self) -> Option<f64> {
        self.hrv.map(|h| h.sdnn_s)
    }

    pub fn sdnn_ms(&self) -> Option<f64> {
        self.hrv.map(|h| h.sdnn_ms())
    }

    /// Recompute the variability after dropping IQR outliers among the confident estimates.
    pub fn without_outliers(mut self) -> Self {
        let bpm: Vec<f64> = self.confident().map(|e| e.bpm).collect();
        self.hrv = nn_summary(&remove_outliers_iqr(&bpm));
        self
    }
}

/// Window, differentiate, transform and score a whole recording.
///
/// Position input is differenced to velocity first. Windows too sparse for a spectrum are
/// reported with the `0.0` sentinel instead of failing the batch.
pub fn run_heart_rate_pipeline(
    series: &MotionSeries,
    cfg: &PipelineConfig,
) -> Result<HeartRatePipelineResult> {
    cfg.validate()?;
    if series.len() < cfg.min_samples {
        warn!(
            "only {} samples, need at least {}; skipping batch",
            series.len(),
            cfg.min_samples
        );
        return Ok(HeartRatePipelineResult::empty(series.len()));
    }
    if let Some(pos) = series
        .samples
        .windows(2)
        .position(|w| w[1].timestamp < w[0].timestamp)
    {
        return Err(PipelineError::Unordered { index: pos + 1 });
    }

    let velocity = series.to_velocity()?;
    let windows = chop(
        &velocity.samples,
        cfg.window_stride_s,
        cfg.window_length_s,
    )?;
    debug!(
        "{} samples over {:.1}s -> {} windows",
        velocity.len(),
        velocity.duration_s(),
        windows.window_count()
    );

    let mut estimates = Vec::new();
    for window in windows {
        let estimate = match estimate_window(&window, cfg) {
            Ok(estimate) => estimate,
            Err(err @ PipelineError::InsufficientSamples { .. })
            | Err(err @ PipelineError::ZeroDuration { .. }) => {
                warn!("window {}: {}; no estimate", window.index, err);
                HeartRateEstimate {
                    timestamp: window_timestamp(&window)?,
                    bpm: 0.0,
                }
            }
            Err(err) => return Err(err),
        };
        debug!(
            "window {} ({} samples) at {}: {:.2} bpm",
            window.index,
            window.len(),
            estimate.timestamp,
            estimate.bpm
        );
        estimates.push(estimate);
    }
    Ok(HeartRatePipelineResult::from_estimates(
        series.len(),
        estimates,
    ))
}
