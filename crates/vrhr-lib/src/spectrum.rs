use crate::error::{PipelineError, Result};
use crate::signal::Sample;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// DFT magnitude spectrum in the standard bin layout.
///
/// Bin 0 is DC; bins `1..=(n-1)/2` are positive frequencies and the remainder are the negative
/// frequencies, each spaced `sample_rate_hz / n` apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub sample_rate_hz: f64,
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn bin_width_hz(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.sample_rate_hz / self.len() as f64
        }
    }

    /// `(frequency, magnitude)` pairs for the non-negative half, in ascending frequency.
    pub fn positive_half(&self) -> Vec<[f64; 2]> {
        self.frequencies
            .iter()
            .zip(&self.magnitudes)
            .filter(|(f, _)| **f >= 0.0)
            .map(|(f, m)| [*f, *m])
            .collect()
    }

    /// Mean-removed magnitude spectrum of `values` sampled at `sample_rate_hz`.
    pub fn from_values(values: &[f64], sample_rate_hz: f64) -> Result<Self> {
        let n = values.len();
        if n < 2 {
            return Err(PipelineError::InsufficientSamples { needed: 2, got: n });
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let mut buffer: Vec<f64> = values.iter().map(|v| v - mean).collect();

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(n);
        let mut half = r2c.make_output_vec();
        r2c.process(&mut buffer, &mut half)
            .map_err(|e| PipelineError::Transform(e.to_string()))?;

        // Real input: the negative-frequency half mirrors the positive one.
        let magnitudes = (0..n)
            .map(|k| {
                let bin = if k < half.len() { k } else { n - k };
                half[bin].norm()
            })
            .collect();
        Ok(Self {
            sample_rate_hz,
            frequencies: fft_frequencies(n, sample_rate_hz),
            magnitudes,
        })
    }

    /// Spectrum of one scalar per sample, using the window's average sampling rate.
    pub fn from_window<F>(window: &[Sample], extract: F) -> Result<Self>
    where
        F: Fn(&Sample) -> Result<f64>,
    {
        let fs = average_sample_rate(window)?;
        let values = window.iter().map(extract).collect::<Result<Vec<_>>>()?;
        Self::from_values(&values, fs)
    }
}

/// `n / (t_last - t_first)`, the mean rate over the whole window.
///
/// Jittery sampling biases this estimate; it is kept because windows are assumed roughly uniform.
pub fn average_sample_rate(window: &[Sample]) -> Result<f64> {
    let n = window.len();
    let (first, last) = match (window.first(), window.last()) {
        (Some(first), Some(last)) if n >= 2 => (first, last),
        _ => return Err(PipelineError::InsufficientSamples { needed: 2, got: n }),
    };
    let elapsed = last.seconds() - first.seconds();
    if !(elapsed > 0.0) {
        return Err(PipelineError::ZeroDuration { samples: n });
    }
    Ok(n as f64 / elapsed)
}

/// Bin centre frequencies for an `n`-point DFT at `sample_rate_hz`.
pub fn fft_frequencies(n: usize, sample_rate_hz: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let spacing = sample_rate_hz / n as f64;
    let last_positive = (n - 1) / 2;
    (0..n)
        .map(|k| {
            let signed = if k <= last_positive {
                k as f64
            } else {
                k as f64 - n as f64
            };
            signed * spacing
        })
        .collect()
}
