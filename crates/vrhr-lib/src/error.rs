use thiserror::Error;

/// Precondition violations raised by the pipeline stages.
///
/// The "no peak in band" case is not an error: it is carried as a `bpm == 0` estimate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("need at least {needed} samples, got {got}")]
    InsufficientSamples { needed: usize, got: usize },
    #[error("window spans zero seconds across {samples} samples; sampling frequency is undefined")]
    ZeroDuration { samples: usize },
    #[error("values and positions must have the same length ({values} != {positions})")]
    LengthMismatch { values: usize, positions: usize },
    #[error("peak delta must be positive, got {0}")]
    NonPositiveDelta(f64),
    #[error("sample at {timestamp} has no channel `{channel}`")]
    MissingChannel { channel: String, timestamp: String },
    #[error("timestamps go backwards at sample {index}")]
    Unordered { index: usize },
    #[error("{0} s is not a representable timestamp")]
    TimestampOutOfRange(f64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("fft failed: {0}")]
    Transform(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
