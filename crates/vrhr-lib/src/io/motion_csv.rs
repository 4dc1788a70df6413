use crate::signal::{channels, timestamp_from_seconds, MotionKind, MotionSeries, Sample};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::warn;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Parse a recording timestamp.
///
/// Accepts the headset export format `2024-09-06_17-37-17-0347440` (fraction of up to nine
/// digits), RFC 3339, naive ISO 8601 (taken as UTC) and Unix epoch seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(ts) = parse_export_timestamp(raw) {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    raw.parse::<f64>().ok().and_then(timestamp_from_seconds)
}

fn parse_export_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let (date, rest) = raw.split_once('_')?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let mut parts = rest.splitn(4, '-');
    let mut field = || parts.next().and_then(|p| p.parse::<u32>().ok());
    let (h, m, s) = (field()?, field()?, field()?);
    let nanos = match parts.next() {
        None => 0,
        Some(frac) if !frac.is_empty() && frac.len() <= 9 && frac.bytes().all(|b| b.is_ascii_digit()) => {
            frac.parse::<u32>().ok()? * 10u32.pow(9 - frac.len() as u32)
        }
        Some(_) => return None,
    };
    let time = NaiveTime::from_hms_nano_opt(h, m, s, nanos)?;
    Some(date.and_time(time).and_utc())
}

/// Inverse of the export format accepted by [`parse_timestamp`] (100 ns resolution).
pub fn format_export_timestamp(ts: &DateTime<Utc>) -> String {
    format!(
        "{}-{:07}",
        ts.format("%Y-%m-%d_%H-%M-%S"),
        ts.timestamp_subsec_nanos() / 100
    )
}

/// Read a motion CSV with a `Timestamp` column and either `LinVel*` or `Pos*` columns.
pub fn read_motion_csv(path: &Path) -> Result<MotionSeries> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_motion_csv(file).with_context(|| format!("reading {}", path.display()))
}

pub fn parse_motion_csv<R: Read>(input: R) -> Result<MotionSeries> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);
    let headers = reader.headers().context("reading header")?.clone();

    let ts_idx = locate_column(&headers, TIMESTAMP_COLUMN)?;
    let (kind, axes) = if has_columns(&headers, &channels::VELOCITY) {
        (MotionKind::Velocity, channels::VELOCITY)
    } else if has_columns(&headers, &channels::POSITION) {
        (MotionKind::Position, channels::POSITION)
    } else {
        anyhow::bail!(
            "expected {} or {} columns",
            channels::VELOCITY.join("/"),
            channels::POSITION.join("/")
        );
    };
    let axis_idx = [
        locate_column(&headers, axes[0])?,
        locate_column(&headers, axes[1])?,
        locate_column(&headers, axes[2])?,
    ];

    let mut samples = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let line = row + 2;
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                warn!("line {line}: {err}; skipped");
                continue;
            }
        };
        let Some(timestamp) = record.get(ts_idx).and_then(parse_timestamp) else {
            warn!("line {line}: unparsable timestamp; skipped");
            continue;
        };
        let mut sample = Sample::new(timestamp);
        let mut complete = true;
        for (axis, idx) in axes.iter().zip(axis_idx) {
            match record.get(idx).and_then(|v| v.parse::<f64>().ok()) {
                Some(v) if v.is_finite() => sample.fields.insert((*axis).to_string(), v),
                _ => {
                    complete = false;
                    break;
                }
            };
        }
        if !complete {
            warn!("line {line}: missing or non-numeric {kind:?} value; skipped");
            continue;
        }
        samples.push(sample);
    }
    if samples.is_empty() {
        anyhow::bail!("no usable motion rows");
    }
    Ok(MotionSeries::new(kind, samples))
}

/// Write `series` in the layout [`read_motion_csv`] expects.
pub fn write_motion_csv<W: Write>(output: W, series: &MotionSeries) -> Result<()> {
    let axes = match series.kind {
        MotionKind::Velocity => channels::VELOCITY,
        MotionKind::Position => channels::POSITION,
    };
    let mut writer = WriterBuilder::new().from_writer(output);
    writer.write_record([TIMESTAMP_COLUMN, axes[0], axes[1], axes[2]])?;
    for sample in &series.samples {
        let mut record = vec![format_export_timestamp(&sample.timestamp)];
        for axis in axes {
            record.push(sample.value(axis)?.to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_motion_csv_path(path: &Path, series: &MotionSeries) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_motion_csv(file, series).with_context(|| format!("writing {}", path.display()))
}

fn has_columns(headers: &StringRecord, names: &[&str]) -> bool {
    names.iter().all(|n| locate_column(headers, n).is_ok())
}

fn locate_column(headers: &StringRecord, requested: &str) -> Result<usize> {
    headers
        .iter()
        .position(|name| name.eq_ignore_ascii_case(requested))
        .ok_or_else(|| anyhow::anyhow!("missing {} column", requested))
}
