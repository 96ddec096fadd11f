#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};

use serde_json::Value;

fn framebridge(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_framebridge"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .env_remove("FRAMEBRIDGE_ORIGIN")
        .env_remove("FRAMEBRIDGE_SRC")
        .output()
        .expect("framebridge should run")
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "fbcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

#[test]
fn encode_then_decode_via_cli() {
    let encoded = framebridge(&["encode", "cart:updated", "--json", r#"{"count":3}"#]);
    assert!(encoded.status.success());
    let report = stdout_json(&encoded);
    let wire = report["wire"].as_str().expect("wire should be a string");
    assert!(wire.contains("\"isMobifyFrameBridge\":true"));

    let decoded = framebridge(&["decode", wire]);
    assert!(decoded.status.success());
    let envelope = stdout_json(&decoded);
    assert_eq!(envelope["event_name"], "cart:updated");
    assert_eq!(envelope["kind"], "custom");
    assert_eq!(envelope["data"]["count"], 3);
}

#[test]
fn decode_foreign_payload_exits_60() {
    let output = framebridge(&["decode", r#"{"eventName":"x","data":1}"#]);
    assert_eq!(output.status.code(), Some(60));

    let output = framebridge(&["decode", "not json at all"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn decode_validates_against_schema_directory() {
    let dir = unique_temp_dir("schema");
    std::fs::write(
        dir.join("cart-updated.schema.json"),
        r#"{"type":"object","required":["count"],"properties":{"count":{"type":"integer"}}}"#,
    )
    .expect("schema should be writable");

    let good = r#"{"eventName":"cart-updated","data":{"count":1},"isMobifyFrameBridge":true}"#;
    let bad = r#"{"eventName":"cart-updated","data":{"count":"one"},"isMobifyFrameBridge":true}"#;
    let dir_arg = dir.to_string_lossy().to_string();

    let output = framebridge(&["decode", good, "--validate", &dir_arg]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["validated"], true);

    let output = framebridge(&["decode", bad, "--validate", &dir_arg]);
    assert_eq!(output.status.code(), Some(60));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn simulate_reports_coalesced_delivery() {
    let output = framebridge(&[
        "simulate",
        "--step",
        "navigate:/a",
        "--step",
        "event:stale",
        "--step",
        "navigate:/b",
        "--step",
        "event:fresh={\"n\":1}",
        "--step",
        "call:add=[20,22]",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report = stdout_json(&output);
    assert_eq!(report["child_href"], "https://app.example.com/b");
    assert_eq!(report["ready"], true);
    assert_eq!(report["calls"][0]["result"], 42);

    let events: Vec<&str> = report["transcript"]
        .as_array()
        .expect("transcript should be an array")
        .iter()
        .filter(|row| row["direction"] == "parent_to_child")
        .filter_map(|row| row["event"].as_str())
        .collect();
    assert!(!events.contains(&"stale"));
    assert!(events.contains(&"fresh"));
}

#[test]
fn simulate_unanswered_call_exits_124() {
    let output = framebridge(&["simulate", "--rpc-timeout", "50ms", "--step", "call:missing"]);
    assert_eq!(output.status.code(), Some(124));
    let report = stdout_json(&output);
    assert_eq!(report["calls"][0]["timed_out"], true);
}

#[test]
fn simulate_rejects_bad_step_with_usage() {
    let output = framebridge(&["simulate", "--step", "teleport:/x"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_framebridge"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("framebridge "));
}
