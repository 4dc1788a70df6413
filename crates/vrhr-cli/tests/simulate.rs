use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::PathBuf};
use tempfile::tempdir;

#[test]
fn simulated_recording_round_trips_through_estimate() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let out = temp.path().join("seated.csv");
    let spec = workspace_root().join("test_data/sim_seated.toml");

    let mut cmd = cargo_bin_cmd!("vrhr");
    cmd.args([
        "simulate",
        "--spec",
        spec.to_str().expect("utf8 path"),
        "--out",
        out.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["name"], "seated-75");
    assert_eq!(summary["kind"], "velocity");
    assert_eq!(summary["samples"], 401);
    assert!(out.exists());
    assert!(fs::read_to_string(&out)?.starts_with("Timestamp,LinVelX,LinVelY,LinVelZ\n"));

    let mut cmd = cargo_bin_cmd!("vrhr");
    cmd.args([
        "estimate",
        "--input",
        out.to_str().expect("utf8 path"),
        "--output",
        "ndjson",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let first: Value = serde_json::from_str(
        String::from_utf8(output)?
            .lines()
            .next()
            .expect("at least one window"),
    )?;
    let bpm = first["predicted_heart_rate"].as_f64().unwrap();
    assert!((bpm - 75.0).abs() <= 3.0, "estimated {bpm}");
    Ok(())
}

#[test]
fn simulate_rejects_invalid_spec() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let spec = temp.path().join("bad.toml");
    fs::write(
        &spec,
        "name = \"bad\"\nduration_s = 10.0\nsample_rate_hz = -5.0\nheart_rate_bpm = 70.0\n",
    )?;
    cargo_bin_cmd!("vrhr")
        .args([
            "simulate",
            "--spec",
            spec.to_str().expect("utf8 path"),
            "--out",
            temp.path().join("x.csv").to_str().expect("utf8 path"),
        ])
        .assert()
        .failure();
    Ok(())
}

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .expect("crates dir")
        .parent()
        .expect("workspace root")
        .to_path_buf()
}
