//! Binary-level tests for `monitor`
//!
//! Counter access depends on the host (`perf_event_paranoid`, PMU
//! availability), so runs against real programs accept either a completed
//! run or a counter-open failure, but never a silent success.

use predicates::prelude::*;
use std::io::Write;

#[test]
fn test_cli_requires_program() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("monitor");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("PROGRAM"));
}

#[test]
fn test_cli_help() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("monitor");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn test_cli_version() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("monitor");
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_config_file_fails() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("monitor");
    cmd.args(["--config", "/nonexistent/walkmon.toml", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_invalid_config_fails_before_launch() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "window_size = 3").unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("monitor");
    cmd.arg("--config")
        .arg(file.path())
        .args(["sh", "-c", "echo launched"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("launched").not())
        .stderr(predicate::str::contains("weights must have window_size"));
}

#[test]
fn test_missing_program_fails() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("monitor");
    cmd.arg("/nonexistent/walkmon-target")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_run_reports_summary_or_counter_failure() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sample_interval_ms = 5\npoll_interval_ms = 1").unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("monitor");
    let output = cmd
        .arg("--config")
        .arg(file.path())
        .args(["--format", "json", "sh", "-c", "exit 3"])
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("Failed to open counter") {
        assert_eq!(output.status.code(), Some(1));
        return;
    }

    assert_eq!(output.status.code(), Some(3), "stderr: {stderr}");
    assert!(stderr.contains("[walkmon: monitoring pid"));
    let summary: serde_json::Value =
        serde_json::from_str(stdout.lines().last().unwrap()).unwrap();
    assert_eq!(summary["exit_code"], 3);
    assert_eq!(summary["trustworthy"], false);
    assert_eq!(summary["handles_released"], 7);
}
