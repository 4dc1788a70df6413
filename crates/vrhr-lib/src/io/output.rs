use crate::detectors::heart_rate::HeartRatePipelineResult;
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const PREDICTION_COLUMNS: [&str; 3] = [
    "timestamp",
    "predicted_heart_rate",
    "predicted_sdnn_ms",
];

/// One output row: a window estimate plus the batch SDNN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,
    pub predicted_heart_rate: f64,
    /// Empty when the batch had no non-zero estimate.
    pub predicted_sdnn_ms: Option<f64>,
    /// Window start in milliseconds since the Unix epoch.
    pub epoch: i64,
}

/// Flatten a pipeline result into output rows, optionally dropping `bpm == 0` windows.
pub fn prediction_records(
    result: &HeartRatePipelineResult,
    skip_zero: bool,
) -> Vec<PredictionRecord> {
    let sdnn_ms = result.sdnn_ms();
    result
        .estimates
        .iter()
        .filter(|e| !skip_zero || e.is_confident())
        .map(|e| PredictionRecord {
            timestamp: e.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            predicted_heart_rate: e.bpm,
            predicted_sdnn_ms: sdnn_ms,
            epoch: e.timestamp.timestamp_millis(),
        })
        .collect()
}

pub fn write_predictions_csv<W: Write>(output: W, records: &[PredictionRecord]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(output);
    writer.write_record(PREDICTION_COLUMNS)?;
    for r in records {
        let bpm = r.predicted_heart_rate.to_string();
        let sdnn = r.predicted_sdnn_ms.map(|v| v.to_string()).unwrap_or_default();
        writer.write_record([r.timestamp.as_str(), bpm.as_str(), sdnn.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// One JSON object per line, as accepted by the result upload endpoint.
pub fn write_predictions_ndjson<W: Write>(mut output: W, records: &[PredictionRecord]) -> Result<()> {
    for r in records {
        serde_json::to_writer(&mut output, r).context("serialising prediction")?;
        output.write_all(b"\n")?;
    }
    output.flush()?;
    Ok(())
}

/// `predicted_heart_rate` column of a predictions CSV.
pub fn parse_predicted_bpm<R: Read>(input: R) -> Result<Vec<f64>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(input);
    let headers = reader.headers().context("reading header")?.clone();
    let idx = headers
        .iter()
        .position(|h| h == PREDICTION_COLUMNS[1])
        .ok_or_else(|| anyhow::anyhow!("missing {} column", PREDICTION_COLUMNS[1]))?;
    let mut out = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.context("reading record")?;
        let value = record
            .get(idx)
            .unwrap_or_default()
            .parse::<f64>()
            .with_context(|| format!("row {}: bad {}", row + 1, PREDICTION_COLUMNS[1]))?;
        out.push(value);
    }
    Ok(out)
}
