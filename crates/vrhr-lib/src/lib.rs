//! Heart-rate and SDNN estimation from VR headset motion.
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod signal;
pub mod spectrum;
pub mod units;

pub use config::{BpmBand, PipelineConfig, PipelineOverrides};
pub use detectors::heart_rate::{
    estimate_window, run_heart_rate_pipeline, HeartRateEstimate, HeartRatePipelineResult,
};
pub use detectors::peaks::{peakdet, Peak, PeakSet};
pub use error::{PipelineError, Result};
pub use metrics::hrv::{nn_summary, remove_outliers_iqr, sdnn, NnSummary};
pub use signal::{chop, difference, MotionKind, MotionSeries, Sample, Window};
pub use spectrum::Spectrum;
