//! Backend-neutral figure descriptions; the CLI renders them with plotters.
use crate::config::BpmBand;
use crate::detectors::heart_rate::{HeartRateEstimate, WindowAnalysis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

/// `0xRRGGBB`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

pub const SPECTRUM_COLOR: Color = Color(0x1F77B4);
pub const PEAK_COLOR: Color = Color(0xFF7F0E);
pub const SELECTED_COLOR: Color = Color(0xD62728);
pub const BAND_COLOR: Color = Color(0x7F7F7F);
pub const BPM_COLOR: Color = Color(0xFF0077);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub radius: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Points(PointSeries),
    /// Vertical marker at an x position spanning the whole y range.
    VLine { name: String, x: f64, style: Style },
}

impl Series {
    /// Data points that should fit inside the axes.
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Points(points) => &points.points,
            Series::VLine { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            series: Vec::new(),
        }
    }

    pub fn with_labels(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over all data points and vertical markers, never degenerate.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let mut b = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for series in &self.series {
            if let Series::VLine { x, .. } = series {
                b.0 = b.0.min(*x);
                b.1 = b.1.max(*x);
            }
            for p in series.points() {
                b.0 = b.0.min(p[0]);
                b.1 = b.1.max(p[0]);
                b.2 = b.2.min(p[1]);
                b.3 = b.3.max(p[1]);
            }
        }
        let widen = |lo: f64, hi: f64| {
            if !(lo.is_finite() && hi.is_finite()) {
                (0.0, 1.0)
            } else if hi - lo <= f64::EPSILON {
                (lo - 0.5, hi + 0.5)
            } else {
                (lo, hi)
            }
        };
        let (x0, x1) = widen(b.0, b.1);
        let (y0, y1) = widen(b.2, b.3);
        (x0, x1, y0, y1)
    }
}

/// Evenly strided subset of at most `max_points` points.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    if max_points == 0 {
        return Vec::new();
    }
    let bucket = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| points[((i as f64 * bucket).floor() as usize).min(points.len() - 1)])
        .collect()
}

/// Positive half of a window spectrum with its maxima, the chosen peak and the band edges.
pub fn figure_from_spectrum(analysis: &WindowAnalysis, band: &BpmBand, max_points: usize) -> Figure {
    let title = if analysis.bpm > 0.0 {
        format!("Window spectrum ({:.1} bpm)", analysis.bpm)
    } else {
        "Window spectrum (no estimate)".to_string()
    };
    let mut fig = Figure::new(Some(title)).with_labels("Frequency (Hz)", "|X(f)|");
    fig.add_series(Series::Line(LineSeries {
        name: "magnitude".into(),
        points: decimate_points(&analysis.spectrum.positive_half(), max_points),
        style: Style {
            width: 1.4,
            color: SPECTRUM_COLOR,
        },
    }));
    fig.add_series(Series::Points(PointSeries {
        name: "maxima".into(),
        points: analysis
            .peaks
            .maxima
            .iter()
            .filter(|p| p.position >= 0.0)
            .map(|p| [p.position, p.value])
            .collect(),
        radius: 3,
        color: PEAK_COLOR,
    }));
    if let Some(selected) = analysis.selected {
        fig.add_series(Series::Points(PointSeries {
            name: "selected".into(),
            points: vec![[selected.position, selected.value]],
            radius: 5,
            color: SELECTED_COLOR,
        }));
    }
    for (name, x) in [("band low", band.low_hz()), ("band high", band.high_hz())] {
        fig.add_series(Series::VLine {
            name: name.into(),
            x,
            style: Style {
                width: 1.0,
                color: BAND_COLOR,
            },
        });
    }
    fig
}

/// Confident estimates over time, x in seconds from the first window.
pub fn figure_from_estimates(estimates: &[HeartRateEstimate], max_points: usize) -> Figure {
    let mut fig = Figure::new(Some("Heart rate".to_string())).with_labels("Time (s)", "BPM");
    let Some(first) = estimates.first() else {
        return fig;
    };
    let points: Vec<[f64; 2]> = estimates
        .iter()
        .filter(|e| e.is_confident())
        .map(|e| {
            let dt = (e.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
            [dt, e.bpm]
        })
        .collect();
    fig.add_series(Series::Line(LineSeries {
        name: "bpm".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 2.0,
            color: BPM_COLOR,
        },
    }));
    fig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::detectors::heart_rate::analyze_channel;
    use crate::signal::Sample;
    use chrono::DateTime;
    use std::f64::consts::PI;

    #[test]
    fn decimation_keeps_first_point_and_limit() {
        let points: Vec<[f64; 2]> = (0..1000).map(|i| [i as f64, 0.0]).collect();
        let out = decimate_points(&points, 100);
        assert_eq!(out.len(), 100);
        assert_eq!(out[0], [0.0, 0.0]);
        assert_eq!(out[1], [10.0, 0.0]);
        assert_eq!(decimate_points(&points[..5], 100).len(), 5);
        assert!(decimate_points(&points, 0).is_empty());
    }

    #[test]
    fn spectrum_figure_marks_selection_and_band() {
        let rows: Vec<Sample> = (0..1000)
            .map(|i| {
                let ts = DateTime::from_timestamp_millis(1_725_000_000_000 + 20 * i).unwrap();
                Sample::new(ts).with("v", (2.0 * PI * 1.5 * i as f64 / 50.0).sin())
            })
            .collect();
        let cfg = PipelineConfig::default();
        let analysis = analyze_channel(&rows, "v", &cfg).unwrap();
        let fig = figure_from_spectrum(&analysis, &cfg.band(), 256);
        assert_eq!(fig.series.len(), 5);
        assert!(fig.series[0].points().len() <= 256);
        assert!(fig.series[0].points().iter().all(|p| p[0] >= 0.0));
        assert_eq!(fig.series[2].points().len(), 1);
        let (x0, x1, _, _) = fig.bounds();
        assert_eq!(x0, 0.0);
        assert!(x1 > 20.0);
    }

    #[test]
    fn estimate_figure_skips_zero_windows() {
        let at = |s: i64| DateTime::from_timestamp(1_725_000_000 + s, 0).unwrap();
        let estimates = [
            HeartRateEstimate { timestamp: at(0), bpm: 70.0 },
            HeartRateEstimate { timestamp: at(2), bpm: 0.0 },
            HeartRateEstimate { timestamp: at(4), bpm: 74.0 },
        ];
        let fig = figure_from_estimates(&estimates, 1024);
        assert_eq!(fig.series[0].points(), &[[0.0, 70.0], [4.0, 74.0]]);
        assert_eq!(fig.bounds(), (0.0, 4.0, 70.0, 74.0));
        assert!(figure_from_estimates(&[], 10).series.is_empty());
    }

    #[test]
    fn degenerate_bounds_are_widened() {
        assert_eq!(Figure::new(None::<String>).bounds(), (0.0, 1.0, 0.0, 1.0));
        let mut fig = Figure::new(None::<String>);
        fig.add_series(Series::Points(PointSeries {
            name: "one".into(),
            points: vec![[2.0, 3.0]],
            radius: 1,
            color: PEAK_COLOR,
        }));
        assert_eq!(fig.bounds(), (1.5, 2.5, 2.5, 3.5));
    }
}
