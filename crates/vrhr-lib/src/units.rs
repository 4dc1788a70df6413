//! Physical unit conversions used across the pipeline.
//!
//! Frequencies are in Hz, heart rates in beats per minute, NN intervals in seconds.

pub const SECONDS_PER_MINUTE: f64 = 60.0;

/// Beat frequency (Hz) to heart rate (BPM).
pub fn hz_to_bpm(hz: f64) -> f64 {
    hz * SECONDS_PER_MINUTE
}

/// Heart rate (BPM) to beat frequency (Hz).
pub fn bpm_to_hz(bpm: f64) -> f64 {
    bpm / SECONDS_PER_MINUTE
}

/// NN interval in seconds for a heart rate in BPM.
///
/// Returns `None` for the `0` "no estimate" sentinel and for any non-positive or non-finite rate.
pub fn nn_interval_s(bpm: f64) -> Option<f64> {
    if bpm.is_finite() && bpm > 0.0 {
        Some(SECONDS_PER_MINUTE / bpm)
    } else {
        None
    }
}

pub fn seconds_to_ms(seconds: f64) -> f64 {
    seconds * 1000.0
}
