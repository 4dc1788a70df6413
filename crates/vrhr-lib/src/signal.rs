use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Channel names shared by the ingestion adapters and the pipeline.
pub mod channels {
    pub const POS_X: &str = "PosX";
    pub const POS_Y: &str = "PosY";
    pub const POS_Z: &str = "PosZ";
    pub const LIN_VEL_X: &str = "LinVelX";
    pub const LIN_VEL_Y: &str = "LinVelY";
    pub const LIN_VEL_Z: &str = "LinVelZ";
    pub const LIN_ACC_X: &str = "LinAccX";
    pub const LIN_ACC_Y: &str = "LinAccY";
    pub const LIN_ACC_Z: &str = "LinAccZ";
    /// Acceleration magnitude, the scalar the spectrum is computed over.
    pub const LIN_ACC: &str = "LinAcc";

    pub const POSITION: [&str; 3] = [POS_X, POS_Y, POS_Z];
    pub const VELOCITY: [&str; 3] = [LIN_VEL_X, LIN_VEL_Y, LIN_VEL_Z];
    pub const ACCELERATION: [&str; 3] = [LIN_ACC_X, LIN_ACC_Y, LIN_ACC_Z];

    /// `(derived, source)` pairs for [`super::difference`].
    pub const POSITION_TO_VELOCITY: [(&str, &str); 3] =
        [(LIN_VEL_X, POS_X), (LIN_VEL_Y, POS_Y), (LIN_VEL_Z, POS_Z)];
    pub const VELOCITY_TO_ACCELERATION: [(&str, &str); 3] = [
        (LIN_ACC_X, LIN_VEL_X),
        (LIN_ACC_Y, LIN_VEL_Y),
        (LIN_ACC_Z, LIN_VEL_Z),
    ];
}

/// One tracked-device reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, channel: &str, value: f64) -> Self {
        self.fields.insert(channel.to_string(), value);
        self
    }

    /// Timestamp on a linear scale (seconds since the Unix epoch, sub-second precision kept).
    pub fn seconds(&self) -> f64 {
        self.timestamp.timestamp() as f64 + self.timestamp.timestamp_subsec_nanos() as f64 * 1e-9
    }

    pub fn get(&self, channel: &str) -> Option<f64> {
        self.fields.get(channel).copied()
    }

    pub fn value(&self, channel: &str) -> Result<f64> {
        self.get(channel)
            .ok_or_else(|| PipelineError::MissingChannel {
                channel: channel.to_string(),
                timestamp: self.timestamp.to_rfc3339(),
            })
    }
}

/// Build a UTC timestamp from fractional Unix seconds.
pub fn timestamp_from_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let mut secs = whole as i64;
    let mut nanos = ((seconds - whole) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    DateTime::from_timestamp(secs, nanos)
}

/// What the channels of a [`MotionSeries`] measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MotionKind {
    /// `PosX/PosY/PosZ`
    Position,
    /// `LinVelX/LinVelY/LinVelZ`
    Velocity,
}

/// Chronologically ordered samples of a single tracked device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionSeries {
    pub kind: MotionKind,
    pub samples: Vec<Sample>,
}

impl MotionSeries {
    pub fn new(kind: MotionKind, samples: Vec<Sample>) -> Self {
        Self { kind, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_s(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.seconds() - first.seconds(),
            _ => 0.0,
        }
    }

    /// True when timestamps never go backwards.
    pub fn is_ordered(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    }

    /// Velocity view of the series; position input is differenced (one sample shorter).
    pub fn to_velocity(&self) -> Result<MotionSeries> {
        match self.kind {
            MotionKind::Velocity => Ok(self.clone()),
            MotionKind::Position => {
                let samples = difference(&self.samples, &channels::POSITION_TO_VELOCITY, true)
                    .collect::<Result<Vec<_>>>()?;
                Ok(MotionSeries::new(MotionKind::Velocity, samples))
            }
        }
    }
}

/// Contiguous slice of samples with timestamps in `[start_s, end_s]`.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    pub index: usize,
    pub start_s: f64,
    pub end_s: f64,
    pub samples: &'a [Sample],
}

impl<'a> Window<'a> {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of the first sample, or the window start for an empty window.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples
            .first()
            .map(|s| s.timestamp)
            .or_else(|| timestamp_from_seconds(self.start_s))
    }
}

/// Upper bound on the number of windows [`chop`] will produce for one recording.
pub const MAX_WINDOWS: usize = 1_000_000;

/// Fixed-stride, fixed-length windows over an ordered sample slice. See [`chop`].
#[derive(Debug, Clone)]
pub struct Chop<'a> {
    samples: &'a [Sample],
    t_first: f64,
    every: f64,
    length: f64,
    next: usize,
    count: usize,
}

impl<'a> Chop<'a> {
    /// Total number of windows, independent of iteration progress.
    pub fn window_count(&self) -> usize {
        self.count
    }
}

impl<'a> Iterator for Chop<'a> {
    type Item = Window<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let index = self.next;
        self.next += 1;
        let start_s = self.t_first + self.every * index as f64;
        let end_s = start_s + self.length;
        // Samples are ordered, so the inclusive range is a contiguous slice.
        let lo = self.samples.partition_point(|s| s.seconds() < start_s);
        let hi = self.samples.partition_point(|s| s.seconds() <= end_s).max(lo);
        Some(Window {
            index,
            start_s,
            end_s,
            samples: &self.samples[lo..hi],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chop<'_> {}

/// Slice `samples` into `floor((t_last - t_first) / every)` windows of `length` seconds.
///
/// Window `i` starts at `t_first + i * every` and holds every sample with
/// `start <= ts <= start + length`. Windows overlap when `length > every` and may be empty.
/// `samples` must be in non-decreasing timestamp order.
pub fn chop(samples: &[Sample], every: f64, length: f64) -> Result<Chop<'_>> {
    if !(every.is_finite() && every > 0.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "window stride must be positive, got {every}"
        )));
    }
    if !(length.is_finite() && length >= 0.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "window length must be non-negative, got {length}"
        )));
    }
    let (t_first, count) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => {
            let t_first = first.seconds();
            let span = (last.seconds() - t_first).max(0.0);
            let count = (span / every).floor();
            if !(count.is_finite() && count <= MAX_WINDOWS as f64) {
                return Err(PipelineError::InvalidConfig(format!(
                    "window stride {every}s gives {count} windows over {span}s (limit {MAX_WINDOWS})"
                )));
            }
            (t_first, count as usize)
        }
        _ => (0.0, 0),
    };
    Ok(Chop {
        samples,
        t_first,
        every,
        length,
        next: 0,
        count,
    })
}

/// First differences between consecutive samples. See [`difference`].
#[derive(Debug, Clone)]
pub struct Difference<'a, 'k, I> {
    inner: I,
    prev: Option<&'a Sample>,
    keys: &'k [(&'k str, &'k str)],
    keep_original: bool,
}

impl<'a, 'k, I> Difference<'a, 'k, I> {
    fn derive(&self, prev: &Sample, current: &Sample) -> Result<Sample> {
        let mut out = if self.keep_original {
            current.clone()
        } else {
            Sample::new(current.timestamp)
        };
        for (target, source) in self.keys {
            let delta = current.value(source)? - prev.value(source)?;
            out.fields.insert((*target).to_string(), delta);
        }
        Ok(out)
    }
}

impl<'a, 'k, I> Iterator for Difference<'a, 'k, I>
where
    I: Iterator<Item = &'a Sample>,
{
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let current = self.inner.next()?;
            if let Some(prev) = self.prev.replace(current) {
                return Some(self.derive(prev, current));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.inner.size_hint();
        if self.prev.is_some() {
            (lo, hi)
        } else {
            (lo.saturating_sub(1), hi.map(|h| h.saturating_sub(1)))
        }
    }
}

/// Lazily compute `current[source] - previous[source]` for each `(target, source)` pair.
///
/// Yields one sample fewer than the input; the first sample is only used as a reference. The
/// difference is not divided by elapsed time. With `keep_original` the derived channels are
/// written over a copy of the current sample, otherwise the output carries only them.
pub fn difference<'a, 'k, I>(
    samples: I,
    keys: &'k [(&'k str, &'k str)],
    keep_original: bool,
) -> Difference<'a, 'k, I::IntoIter>
where
    I: IntoIterator<Item = &'a Sample>,
{
    Difference {
        inner: samples.into_iter(),
        prev: None,
        keys,
        keep_original,
    }
}

/// Euclidean norm of three channels.
pub fn magnitude(sample: &Sample, axes: [&str; 3]) -> Result<f64> {
    let mut acc = 0.0;
    for axis in axes {
        let v = sample.value(axis)?;
        acc += v * v;
    }
    Ok(acc.sqrt())
}

/// Copy of `sample` with the norm of `axes` stored under `target`.
pub fn with_magnitude(sample: &Sample, axes: [&str; 3], target: &str) -> Result<Sample> {
    let norm = magnitude(sample, axes)?;
    Ok(sample.clone().with(target, norm))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(seconds: f64) -> Sample {
        Sample::new(timestamp_from_seconds(seconds).expect("valid timestamp"))
    }

    fn even_series(n: usize, duration_s: f64) -> Vec<Sample> {
        let t0 = 1_725_000_000.0;
        let dt = duration_s / (n - 1) as f64;
        (0..n)
            .map(|i| sample_at(t0 + i as f64 * dt).with(channels::POS_X, i as f64))
            .collect()
    }

    #[test]
    fn chop_yields_floor_of_duration_over_stride() {
        let rows = even_series(121, 60.0);
        assert_eq!(chop(&rows, 2.0, 20.0).unwrap().count(), 30);
        assert_eq!(chop(&rows, 5.0, 20.0).unwrap().count(), 12);
        assert_eq!(chop(&rows, 7.0, 20.0).unwrap().count(), 8);
    }

    #[test]
    fn chop_bounds_are_inclusive() {
        let rows: Vec<Sample> = (0..=10).map(|i| sample_at(100.0 + i as f64)).collect();
        let windows: Vec<_> = chop(&rows, 2.0, 4.0).unwrap().collect();
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0].len(), 5);
        assert_eq!(windows[0].samples[0].seconds(), 100.0);
        assert_eq!(windows[0].samples[4].seconds(), 104.0);
        assert_eq!(windows[4].samples[0].seconds(), 108.0);
        // truncated at the end of the recording
        assert_eq!(windows[4].len(), 3);
    }

    #[test]
    fn chop_is_restartable_and_tolerates_gaps() {
        let mut rows: Vec<Sample> = (0..3).map(|i| sample_at(i as f64)).collect();
        rows.push(sample_at(30.0));
        let chopped = chop(&rows, 5.0, 2.0).unwrap();
        let first: Vec<usize> = chopped.clone().map(|w| w.len()).collect();
        let second: Vec<usize> = chopped.map(|w| w.len()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn chop_rejects_stride_with_too_many_windows() {
        let rows = even_series(30, 3.0);
        assert!(matches!(
            chop(&rows, 1e-300, 20.0),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(chop(&rows, 6.0 / MAX_WINDOWS as f64, 20.0).is_ok());
    }

    #[test]
    fn chop_of_empty_input_is_empty() {
        assert_eq!(chop(&[], 2.0, 20.0).unwrap().count(), 0);
        assert!(chop(&[], 0.0, 20.0).is_err());
    }

    #[test]
    fn empty_window_reports_start_timestamp() {
        let rows = vec![sample_at(0.0), sample_at(50.0)];
        let window = chop(&rows, 10.0, 1.0).unwrap().nth(2).unwrap();
        assert!(window.is_empty());
        assert_eq!(window.timestamp(), timestamp_from_seconds(20.0));
    }

    #[test]
    fn difference_of_constant_channel_is_zero() {
        let rows: Vec<Sample> = (0..8)
            .map(|i| sample_at(i as f64).with(channels::LIN_VEL_X, 3.5))
            .collect();
        let out = difference(&rows, &[(channels::LIN_ACC_X, channels::LIN_VEL_X)], false)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(out.len(), rows.len() - 1);
        assert!(out.iter().all(|s| s.get(channels::LIN_ACC_X) == Some(0.0)));
        assert!(out.iter().all(|s| s.get(channels::LIN_VEL_X).is_none()));
        assert_eq!(out[0].timestamp, rows[1].timestamp);
    }

    #[test]
    fn difference_keeps_original_fields_on_request() {
        let rows = vec![
            sample_at(0.0).with(channels::POS_X, 1.0).with("Extra", 7.0),
            sample_at(1.0).with(channels::POS_X, 4.0).with("Extra", 9.0),
        ];
        let out = difference(&rows, &[(channels::LIN_VEL_X, channels::POS_X)], true)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get(channels::LIN_VEL_X), Some(3.0));
        assert_eq!(out[0].get("Extra"), Some(9.0));
        assert_eq!(out[0].get(channels::POS_X), Some(4.0));
    }

    #[test]
    fn difference_is_not_time_normalised() {
        let rows = vec![
            sample_at(0.0).with(channels::POS_X, 0.0),
            sample_at(0.1).with(channels::POS_X, 1.0),
            sample_at(5.0).with(channels::POS_X, 2.0),
        ];
        let out: Vec<f64> = difference(&rows, &[(channels::LIN_VEL_X, channels::POS_X)], false)
            .map(|s| s.unwrap().get(channels::LIN_VEL_X).unwrap())
            .collect();
        assert_eq!(out, vec![1.0, 1.0]);
    }

    #[test]
    fn difference_reports_missing_channel() {
        let rows = vec![sample_at(0.0), sample_at(1.0)];
        let err = difference(&rows, &channels::POSITION_TO_VELOCITY, true)
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingChannel { .. }));
    }

    #[test]
    fn position_series_converts_to_velocity() {
        let rows: Vec<Sample> = (0..4)
            .map(|i| {
                let t = i as f64;
                sample_at(t)
                    .with(channels::POS_X, t * 2.0)
                    .with(channels::POS_Y, 1.0)
                    .with(channels::POS_Z, -t)
            })
            .collect();
        let series = MotionSeries::new(MotionKind::Position, rows);
        let velocity = series.to_velocity().unwrap();
        assert_eq!(velocity.kind, MotionKind::Velocity);
        assert_eq!(velocity.len(), 3);
        let v = &velocity.samples[2];
        assert_eq!(v.get(channels::LIN_VEL_X), Some(2.0));
        assert_eq!(v.get(channels::LIN_VEL_Y), Some(0.0));
        assert_eq!(v.get(channels::LIN_VEL_Z), Some(-1.0));
    }

    #[test]
    fn magnitude_is_euclidean_norm() {
        let s = sample_at(0.0)
            .with(channels::LIN_ACC_X, 3.0)
            .with(channels::LIN_ACC_Y, 4.0)
            .with(channels::LIN_ACC_Z, 12.0);
        let s = with_magnitude(&s, channels::ACCELERATION, channels::LIN_ACC).unwrap();
        assert_eq!(s.get(channels::LIN_ACC), Some(13.0));
    }

    #[test]
    fn timestamp_from_seconds_keeps_fraction() {
        let ts = timestamp_from_seconds(1_725_000_000.25).unwrap();
        assert_eq!(ts.timestamp(), 1_725_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
        assert!(timestamp_from_seconds(f64::NAN).is_none());
    }
}
