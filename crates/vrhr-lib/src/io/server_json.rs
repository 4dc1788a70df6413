//! Readers for the recording server's JSON payloads.
use super::motion_csv::parse_timestamp;
use crate::signal::{channels, timestamp_from_seconds, MotionKind, MotionSeries, Sample};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Epoch(f64),
    Text(String),
}

impl RawTimestamp {
    fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Epoch(secs) => timestamp_from_seconds(*secs),
            RawTimestamp::Text(text) => parse_timestamp(text),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Frame {
    time_stamp: RawTimestamp,
    lin_vel: Option<Vec3>,
    head_position: Option<Vec3>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordingDump {
    head_controllers_motion_record_list: Vec<Frame>,
}

#[derive(Debug, Clone, Deserialize)]
struct FollowRecord {
    /// Milliseconds since the Unix epoch.
    epoch: Option<f64>,
    position: Option<Vec3>,
}

fn vec3_sample(timestamp: DateTime<Utc>, axes: [&str; 3], v: Vec3) -> Sample {
    Sample::new(timestamp)
        .with(axes[0], v.x)
        .with(axes[1], v.y)
        .with(axes[2], v.z)
}

/// Parse a recording dump (`headControllersMotionRecordList`).
///
/// The result holds velocities when every frame carries `linVel`, otherwise head positions.
pub fn parse_recording_dump(text: &str) -> Result<MotionSeries> {
    let dump: RecordingDump = serde_json::from_str(text).context("parsing recording dump")?;
    let frames = dump.head_controllers_motion_record_list;
    let velocity = frames.iter().all(|f| f.lin_vel.is_some());
    let (kind, axes) = if velocity {
        (MotionKind::Velocity, channels::VELOCITY)
    } else {
        (MotionKind::Position, channels::POSITION)
    };

    let mut samples = Vec::with_capacity(frames.len());
    for (idx, frame) in frames.iter().enumerate() {
        let Some(timestamp) = frame.time_stamp.resolve() else {
            warn!("frame {idx}: unparsable timeStamp; skipped");
            continue;
        };
        let vector = if velocity { frame.lin_vel } else { frame.head_position };
        match vector {
            Some(v) => samples.push(vec3_sample(timestamp, axes, v)),
            None => warn!("frame {idx}: no headPosition; skipped"),
        }
    }
    if samples.is_empty() {
        anyhow::bail!("recording dump has no usable frames");
    }
    Ok(MotionSeries::new(kind, samples))
}

pub fn read_recording_dump(path: &Path) -> Result<MotionSeries> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_recording_dump(&text).with_context(|| format!("in {}", path.display()))
}

/// Parse follow-API lines of the form `index,{json}` into head positions.
///
/// Records without `epoch` or `position` are skipped; missing coordinates default to 0.
/// The result may be empty.
pub fn parse_follow_lines(text: &str) -> Result<MotionSeries> {
    let mut samples = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((_, payload)) = trimmed.split_once(',') else {
            warn!("line {}: expected `index,{{json}}`; skipped", idx + 1);
            continue;
        };
        let record: FollowRecord = match serde_json::from_str(payload) {
            Ok(record) => record,
            Err(err) => {
                warn!("line {}: {}; skipped", idx + 1, err);
                continue;
            }
        };
        let (Some(epoch_ms), Some(position)) = (record.epoch, record.position) else {
            debug!("line {}: no epoch/position; skipped", idx + 1);
            continue;
        };
        let Some(timestamp) = timestamp_from_seconds(epoch_ms / 1000.0) else {
            warn!("line {}: epoch {} out of range; skipped", idx + 1, epoch_ms);
            continue;
        };
        samples.push(vec3_sample(timestamp, channels::POSITION, position));
    }
    Ok(MotionSeries::new(MotionKind::Position, samples))
}

pub fn read_follow_lines(path: &Path) -> Result<MotionSeries> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let series = parse_follow_lines(&text)?;
    if series.is_empty() {
        anyhow::bail!("no usable records in {}", path.display());
    }
    Ok(series)
}
