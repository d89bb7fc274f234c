//! Smoke tests driving the actual compiled `cdp-orchestrator` binary.

use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn list_tests_reports_an_empty_directory() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("cdp-orchestrator").unwrap();
    cmd.arg("list-tests").arg("--dir").arg(dir.path());
    cmd.assert().success().stdout(contains("no test definitions found"));
}

#[test]
fn run_rejects_an_unknown_test_id() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("cdp-orchestrator").unwrap();
    cmd.arg("run").arg("does-not-exist").arg("--dir").arg(dir.path());
    cmd.assert().failure();
}
