use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Bin index, or the caller's x-axis value (e.g. Hz).
    pub position: f64,
    pub value: f64,
}

/// Confirmed extrema in detection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakSet {
    pub maxima: Vec<Peak>,
    pub minima: Vec<Peak>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seeking {
    Max,
    Min,
}

/// Hysteresis peak detection.
///
/// A maximum is confirmed once the signal falls more than `delta` below it, and a minimum once
/// the signal rises more than `delta` above it. Extrema still unconfirmed when the scan ends are
/// dropped. Positions are taken from `x` when given, otherwise they are sample indices.
pub fn peakdet(v: &[f64], delta: f64, x: Option<&[f64]>) -> Result<PeakSet> {
    if let Some(x) = x {
        if x.len() != v.len() {
            return Err(PipelineError::LengthMismatch {
                values: v.len(),
                positions: x.len(),
            });
        }
    }
    if !(delta > 0.0) {
        return Err(PipelineError::NonPositiveDelta(delta));
    }
    let position = |i: usize| x.map_or(i as f64, |x| x[i]);

    let mut peaks = PeakSet::default();
    let (mut min_val, mut min_idx) = (f64::INFINITY, 0usize);
    let (mut max_val, mut max_idx) = (f64::NEG_INFINITY, 0usize);
    let mut state = Seeking::Max;

    for (i, &this) in v.iter().enumerate() {
        if this > max_val {
            max_val = this;
            max_idx = i;
        }
        if this < min_val {
            min_val = this;
            min_idx = i;
        }

        match state {
            Seeking::Max if this < max_val - delta => {
                peaks.maxima.push(Peak {
                    position: position(max_idx),
                    value: max_val,
                });
                min_val = this;
                min_idx = i;
                state = Seeking::Min;
            }
            Seeking::Min if this > min_val + delta => {
                peaks.minima.push(Peak {
                    position: position(min_idx),
                    value: min_val,
                });
                max_val = this;
                max_idx = i;
                state = Seeking::Max;
            }
            _ => {}
        }
    }
    Ok(peaks)
}
