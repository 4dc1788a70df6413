use crate::units::{nn_interval_s, seconds_to_ms};
use serde::{Deserialize, Serialize};

/// Time-domain variability of a sequence of per-window heart-rate estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NnSummary {
    /// Number of non-zero estimates that contributed.
    pub n: usize,
    pub mean_nn_s: f64,
    pub sdnn_s: f64,
}

impl NnSummary {
    pub fn sdnn_ms(&self) -> f64 {
        seconds_to_ms(self.sdnn_s)
    }
}

/// NN intervals (seconds) for every non-zero heart rate, in input order.
pub fn nn_intervals(bpm: &[f64]) -> Vec<f64> {
    bpm.iter().filter_map(|&b| nn_interval_s(b)).collect()
}

pub fn nn_summary(bpm: &[f64]) -> Option<NnSummary> {
    let nn = nn_intervals(bpm);
    let n = nn.len();
    if n == 0 {
        return None;
    }
    let mean = nn.iter().sum::<f64>() / n as f64;
    // population variance: the estimates are the whole batch, not a sample of it
    let var = nn.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    Some(NnSummary {
        n,
        mean_nn_s: mean,
        sdnn_s: var.sqrt(),
    })
}

/// SDNN in seconds, or `None` when no estimate is non-zero.
pub fn sdnn(bpm: &[f64]) -> Option<f64> {
    nn_summary(bpm).map(|s| s.sdnn_s)
}

/// Drop values outside the Tukey fences `[q1 - 1.5 IQR, q3 + 1.5 IQR]`, keeping input order.
///
/// Quartiles use the midpoint rule between the two nearest ranks.
pub fn remove_outliers_iqr(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return Vec::new();
    }
    sorted.sort_by(f64::total_cmp);
    let q1 = midpoint_percentile(&sorted, 25.0);
    let q3 = midpoint_percentile(&sorted, 75.0);
    let iqr = q3 - q1;
    let (lower, upper) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    values
        .iter()
        .copied()
        .filter(|v| (lower..=upper).contains(v))
        .collect()
}

fn midpoint_percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    (sorted[lo] + sorted[hi]) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_rates_have_zero_sdnn() {
        assert_eq!(sdnn(&[72.0; 5]), Some(0.0));
    }

    #[test]
    fn zeros_are_excluded() {
        let with_zeros = [0.0, 60.0, 0.0, 120.0, 90.0, 0.0];
        let without = [60.0, 120.0, 90.0];
        assert_eq!(sdnn(&with_zeros), sdnn(&without));
        assert_eq!(nn_summary(&with_zeros).map(|s| s.n), Some(3));
    }

    #[test]
    fn uses_population_deviation() {
        // NN = [1.0, 0.5] -> mean 0.75, population sd 0.25
        let summary = nn_summary(&[60.0, 120.0]).unwrap();
        assert!((summary.mean_nn_s - 0.75).abs() < 1e-12);
        assert!((summary.sdnn_s - 0.25).abs() < 1e-12);
        assert!((summary.sdnn_ms() - 250.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_has_no_result() {
        assert_eq!(sdnn(&[]), None);
        assert_eq!(sdnn(&[0.0, 0.0]), None);
    }

    #[test]
    fn iqr_drops_outliers_and_keeps_order() {
        let values = [4.0, 1.0, 100.0, 3.0, 2.0];
        assert_eq!(remove_outliers_iqr(&values), vec![4.0, 1.0, 3.0, 2.0]);
        assert!(remove_outliers_iqr(&[]).is_empty());
    }

    #[test]
    fn iqr_uses_midpoint_quartiles() {
        // q1 = (2+3)/2, q3 = (4+5)/2 -> fences [-0.5, 7.5]; linear interpolation would keep 8
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 8.0];
        let kept = remove_outliers_iqr(&values);
        assert_eq!(kept, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
