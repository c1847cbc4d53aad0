use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[motor]
model = "lego-ev3-l"

[control]
tick_ms = 2

[runner]
max_ms = 20000
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn summary_line(stdout: &[u8]) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(stdout);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"abort_reason\""))
        .unwrap_or("")
        .to_string();
    assert!(
        !line.is_empty(),
        "no JSONL line with abort_reason found; stdout was: {stdout}"
    );
    serde_json::from_str(&line).expect("valid JSON")
}

/// Validate the JSONL schema for a successful position move.
#[rstest]
fn jsonl_success_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("tacho").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args([
            "run",
            "--mode",
            "position",
            "--position",
            "300",
            "--regulated",
            "--speed",
            "300",
            "--ramp-up-ms",
            "100",
            "--ramp-down-ms",
            "200",
            "--stop-mode",
            "brake",
        ]);

    let out = cmd.assert().success().get_output().stdout.clone();
    let v = summary_line(&out);

    // Required numeric fields
    assert!(v.get("timestamp").and_then(|x| x.as_i64()).is_some());
    assert!(v.get("duration_ms").and_then(|x| x.as_u64()).is_some());
    assert!(v.get("ticks").and_then(|x| x.as_u64()).is_some());
    assert!(v.get("sim_ms").and_then(|x| x.as_u64()).is_some());
    assert_eq!(v.get("target").and_then(|x| x.as_i64()), Some(300));
    assert_eq!(v.get("mode").and_then(|x| x.as_str()), Some("position"));
    assert_eq!(v.get("state").and_then(|x| x.as_str()), Some("idle"));

    let position = v.get("position").and_then(|x| x.as_i64()).unwrap();
    assert!((300..=330).contains(&position), "stopped at {position}");
    assert_eq!(v.get("plant_position").and_then(|x| x.as_i64()), Some(position));

    // Abort reason must be null on success
    assert!(v.get("abort_reason").is_some());
    assert!(v.get("abort_reason").unwrap().is_null());
}

/// Validate the JSONL schema for an aborted run, including abort_reason and
/// the structured error on stderr.
#[rstest]
#[case(&[], "MoveTimeout", 3)]
#[case(&[("TACHO_TEST_ESTOP_AFTER_MS", "20")], "Estop", 2)]
fn jsonl_abort_schema(#[case] env: &[(&str, &str)], #[case] reason: &str, #[case] code: i32) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("tacho").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--mode", "time", "--time-ms", "2000", "--max-ms", "60"]);
    for (k, val) in env {
        cmd.env(k, val);
    }

    let assert = cmd.assert().code(code);
    let output = assert.get_output();
    let v = summary_line(&output.stdout);
    assert_eq!(v.get("abort_reason").and_then(|x| x.as_str()), Some(reason));
    assert!(v.get("position").unwrap().is_null());

    let stderr = String::from_utf8_lossy(&output.stderr);
    let err_line = stderr
        .lines()
        .find(|l| l.contains("\"reason\""))
        .expect("structured error on stderr");
    let e: serde_json::Value = serde_json::from_str(err_line).expect("valid JSON");
    assert_eq!(e.get("reason").and_then(|x| x.as_str()), Some(reason));
    assert!(e.get("message").and_then(|x| x.as_str()).is_some());
}
