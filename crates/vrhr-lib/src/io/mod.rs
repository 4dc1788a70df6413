pub mod motion_csv;
pub mod output;
pub mod server_json;
pub mod text;

use crate::signal::MotionSeries;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported motion recording layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MotionFormat {
    /// `Timestamp` plus `LinVel*` or `Pos*` columns.
    Csv,
    /// Recording dump with `headControllersMotionRecordList`.
    RecordingJson,
    /// Follow-API `index,{json}` lines.
    FollowLines,
}

impl MotionFormat {
    /// Guess from the file extension; anything unrecognised is treated as CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => MotionFormat::RecordingJson,
            Some("ndjson") | Some("lines") | Some("log") => MotionFormat::FollowLines,
            _ => MotionFormat::Csv,
        }
    }
}

/// Load a motion recording, detecting the layout from the extension unless `format` is given.
pub fn read_motion(path: &Path, format: Option<MotionFormat>) -> Result<MotionSeries> {
    let format = format.unwrap_or_else(|| MotionFormat::from_path(path));
    log::debug!("reading {} as {:?}", path.display(), format);
    match format {
        MotionFormat::Csv => motion_csv::read_motion_csv(path),
        MotionFormat::RecordingJson => server_json::read_recording_dump(path),
        MotionFormat::FollowLines => server_json::read_follow_lines(path),
    }
}
