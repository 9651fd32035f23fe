use assert_cmd::prelude::*;
use serde_json::Value;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON: {l:?}: {e}")))
        .collect()
}

#[test]
fn json_stdout_is_one_object_per_line() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("hrfs.toml");
    fs::write(
        &cfg,
        "[motion]\nrotation_distance = 23.0\n\n[runout]\nunderextrusion_max_rate = 0.3\nunderextrusion_period = 1.0\n",
    )
    .unwrap();

    let out = Command::cargo_bin("hrfs")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("warn")
        .arg("--config")
        .arg(&cfg)
        .args(["monitor", "--duration", "6", "--runout-after", "3"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));

    let lines = json_lines(&out.stdout);
    assert!(
        lines
            .iter()
            .any(|v| v["level"] == "error" && v["message"] == "filament_sensor: Filament not present")
    );
    let runout = lines
        .iter()
        .find(|v| v.get("runout").is_some())
        .expect("runout line");
    assert_eq!(runout["runout"]["pause"], true);
    assert!(runout["runout"]["script"].as_str().unwrap().starts_with("PAUSE"));

    let summary = lines
        .iter()
        .find(|v| v.get("summary").is_some())
        .expect("summary line");
    assert_eq!(summary["summary"]["command"], "monitor");
    assert_eq!(summary["summary"]["runouts"], 1);
    assert_eq!(summary["summary"]["status"]["filament_detected"], false);

    // The error report comes last
    let last = lines.last().unwrap();
    assert_eq!(last["reason"], "Runout");
    assert_eq!(last["details"]["runouts"], 1);
}

#[test]
fn json_query_reports_resolution() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("hrfs.toml");
    fs::write(
        &cfg,
        "[motion]\nrotation_distance = 23.0\nhysteresis_bits = 3\n\n[runout]\nunderextrusion_max_rate = 0.3\nunderextrusion_period = 1.0\n",
    )
    .unwrap();

    let out = Command::cargo_bin("hrfs")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("query")
        .output()
        .unwrap();
    assert!(out.status.success());

    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1);
    let v = &lines[0];
    assert_eq!(v["resolution_bits"], 12);
    assert_eq!(v["ignored_bits"], 3);
    assert_eq!(v["status"]["sensor_connected"], true);
}
