use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::PathBuf};
use tempfile::tempdir;

#[test]
fn window_spectrum_reports_selected_peak() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("vrhr");
    cmd.args([
        "window-spectrum",
        "--input",
        sample_path("test_data/velocity_75bpm.csv").as_str(),
        "--index",
        "0",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["window_count"], 12);
    assert_eq!(report["samples"], 201);
    assert_close(report["sample_rate_hz"].as_f64().unwrap(), 200.0 / 19.9, 1e-3);
    assert_close(report["bpm"].as_f64().unwrap(), 60.0 * 25.0 / 19.9, 0.1);
    assert_close(
        report["selected"]["position"].as_f64().unwrap(),
        25.0 / 19.9,
        1e-3,
    );
    let spectrum = report["spectrum"].as_array().unwrap();
    assert_eq!(spectrum.len(), 100);
    assert!(spectrum.iter().all(|p| p[0].as_f64().unwrap() >= 0.0));
    Ok(())
}

#[test]
fn window_spectrum_rejects_out_of_range_index() {
    cargo_bin_cmd!("vrhr")
        .args([
            "window-spectrum",
            "--input",
            sample_path("test_data/velocity_75bpm.csv").as_str(),
            "--index",
            "12",
        ])
        .assert()
        .failure();
}

#[test]
fn peaks_from_stdin() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("vrhr");
    cmd.args(["peaks", "--delta", "0.5"])
        .write_stdin("0\n1\n0\n2\n0.5\n3\n0\n");
    let output = cmd.assert().success().get_output().stdout.clone();
    let peaks: Value = serde_json::from_slice(&output)?;
    let positions: Vec<f64> = peaks["maxima"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["position"].as_f64().unwrap())
        .collect();
    assert_eq!(positions, vec![1.0, 3.0, 5.0]);
    assert_eq!(peaks["minima"].as_array().unwrap().len(), 2);
    Ok(())
}

#[test]
fn peaks_use_x_axis_and_check_lengths() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let values = temp.path().join("values.txt");
    let x = temp.path().join("x.txt");
    let short = temp.path().join("short.txt");
    fs::write(&values, "0\n4\n1\n")?;
    fs::write(&x, "0.5\n1.5\n2.5\n")?;
    fs::write(&short, "0.5\n")?;

    let mut cmd = cargo_bin_cmd!("vrhr");
    cmd.args([
        "peaks",
        "--input",
        values.to_str().expect("utf8 path"),
        "--delta",
        "1",
        "--x",
        x.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let peaks: Value = serde_json::from_slice(&output)?;
    assert_eq!(peaks["maxima"][0]["position"], 1.5);
    assert_eq!(peaks["maxima"][0]["value"], 4.0);

    cargo_bin_cmd!("vrhr")
        .args([
            "peaks",
            "--input",
            values.to_str().expect("utf8 path"),
            "--x",
            short.to_str().expect("utf8 path"),
        ])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn sdnn_of_bpm_list() -> Result<(), Box<dyn Error>> {
    let input = sample_path("test_data/bpm_series.txt");
    let mut cmd = cargo_bin_cmd!("vrhr");
    cmd.args(["sdnn", "--input", input.as_str()]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["windows"], 7);
    assert_eq!(report["n"], 5);
    assert_close(report["sdnn_ms"].as_f64().unwrap(), 151.323, 1e-2);

    let mut cmd = cargo_bin_cmd!("vrhr");
    cmd.args(["sdnn", "--input", input.as_str(), "--drop-outliers"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["n"], 4);
    assert_close(report["sdnn_ms"].as_f64().unwrap(), 23.076, 1e-2);
    Ok(())
}

#[test]
fn sdnn_of_predictions_matches_estimate_column() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let predictions = temp.path().join("predictions.csv");
    cargo_bin_cmd!("vrhr")
        .args([
            "estimate",
            "--input",
            sample_path("test_data/velocity_75bpm.csv").as_str(),
            "--out",
            predictions.to_str().expect("utf8 path"),
        ])
        .assert()
        .success();
    let contents = fs::read_to_string(&predictions)?;
    let column: f64 = contents
        .lines()
        .nth(1)
        .and_then(|l| l.split(',').nth(2))
        .unwrap()
        .parse()?;

    let mut cmd = cargo_bin_cmd!("vrhr");
    cmd.args(["sdnn", "--input", predictions.to_str().expect("utf8 path")]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["windows"], 12);
    assert_close(report["sdnn_ms"].as_f64().unwrap(), column, 1e-9);
    Ok(())
}

#[test]
fn sdnn_without_estimates_is_null() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("vrhr");
    cmd.arg("sdnn").write_stdin("0\n0\n0\n");
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["n"], 0);
    assert!(report["sdnn_ms"].is_null());
    Ok(())
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(
        diff <= tol,
        "diff {} exceeded tol {} ({} vs {})",
        diff,
        tol,
        a,
        b
    );
}

fn sample_path(relative: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join(relative)
        .to_string_lossy()
        .to_string()
}
