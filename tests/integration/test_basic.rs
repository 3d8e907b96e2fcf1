#![cfg(unix)]

#[path = "common.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::Path;

/// `tsb` invocation wired to the fake server inside `workspace`.
fn tsb(workspace: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("tsb");
    cmd.arg("--workspace")
        .arg(workspace)
        .arg("--node")
        .arg("sh")
        .arg("--tsserver")
        .arg(common::fake_tsserver())
        .arg("--timeout")
        .arg("10");
    cmd
}

#[test]
fn test_help() {
    let mut cmd = cargo_bin_cmd!("tsb");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tsserver"))
        .stdout(predicate::str::contains("quickinfo"));
}

#[test]
fn test_quickinfo_command() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.ts");
    std::fs::write(&file, "const answer = 42;\n").unwrap();

    tsb(dir.path())
        .arg("quickinfo")
        .arg(&file)
        .args(["-l", "1", "-c", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("const answer: 42"));
}

#[test]
fn test_diagnostics_command() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.ts");
    std::fs::write(&file, "const x: number = \"no\";\n").unwrap();

    tsb(dir.path())
        .arg("diagnostics")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("TS2322"));
}

#[test]
fn test_raw_command_json() {
    let dir = tempfile::tempdir().unwrap();

    let output = tsb(dir.path())
        .args(["--format", "json", "raw", "navtree", "--args", "{\"file\":\"/virtual/a.ts\"}"])
        .output()
        .expect("failed to run tsb");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "command failed: {stdout}");

    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["command"], "navtree");
}

#[test]
fn test_raw_rejects_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    tsb(dir.path())
        .args(["raw", "navtree", "--args", "{oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--args must be valid JSON"));
}

#[test]
fn test_missing_tsserver_script() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("tsb");
    cmd.arg("--workspace")
        .arg(dir.path())
        .args(["--node", "sh", "raw", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("entry script not found"));
}
