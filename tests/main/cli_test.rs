//! CLI contract tests.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

const SECRET: &str = "cli-test-secret";

/// Isolated home with a config pointing the ledger into it.
fn workspace() -> (TempDir, PathBuf) {
    let home = tempfile::tempdir().expect("should create temp dir");
    let config = home.path().join("config.toml");
    let ledger = home.path().join("data").join("cx_log.sqlite3");
    fs::write(
        &config,
        format!(
            "[ledger]\npath = {:?}\n\n[plugins]\nengine_patterns = []\n",
            ledger.display().to_string()
        ),
    )
    .expect("write config");
    (home, config)
}

fn cx(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cx-router").expect("binary should build");
    cmd.current_dir(home)
        .env("HOME", home)
        .env_remove("CX_REPORTS_DIR")
        .env_remove("RUST_LOG")
        .env("CX_SECRET", SECRET);
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("run cx-router");
    assert!(
        output.status.success(),
        "cx-router failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn no_action_prints_help() {
    let (home, _config) = workspace();
    let stdout = stdout_of(&mut cx(home.path()));
    assert!(stdout.contains("--dispatch"));
    assert!(stdout.contains("--summary"));
}

#[test]
fn malformed_dispatch_is_ignored() {
    let (home, config) = workspace();
    let stdout = stdout_of(
        cx(home.path())
            .arg("--config")
            .arg(&config)
            .args(["--dispatch", "badvector:onlythree"]),
    );
    assert!(stdout.contains("malformed vector, ignored"), "{stdout}");

    let summary = stdout_of(cx(home.path()).arg("--config").arg(&config).arg("--summary"));
    let listing = summary
        .split("recent CX events:")
        .nth(1)
        .expect("ledger section");
    assert!(listing.trim().is_empty(), "{summary}");
}

#[test]
fn dispatch_then_summary_shows_event() {
    let (home, config) = workspace();
    let stdout = stdout_of(
        cx(home.path())
            .arg("--config")
            .arg(&config)
            .args(["--dispatch", "hyperx.logger:log:0.3:record:write"])
            .args(["--payload", r#"{"msg":"hi"}"#]),
    );
    assert!(stdout.contains("handled by *:log:record:write"), "{stdout}");

    let summary = stdout_of(cx(home.path()).arg("--config").arg(&config).arg("--summary"));
    assert!(summary.contains("active routes: 1"), "{summary}");
    assert!(summary.contains("↳ *:log:record:write"), "{summary}");
    assert!(
        summary.contains("| hyperx.logger:log:record:write"),
        "{summary}"
    );
}

#[test]
fn invalid_payload_falls_back_to_empty_object() {
    let (home, config) = workspace();
    let stdout = stdout_of(
        cx(home.path())
            .arg("--config")
            .arg(&config)
            .args(["--dispatch", "hyperx.logger:log:0.3:record:write"])
            .args(["--payload", "{not json"]),
    );
    assert!(stdout.contains("handled by"), "{stdout}");
}

#[test]
fn unrouted_dispatch_reports_no_route() {
    let (home, config) = workspace();
    let stdout = stdout_of(
        cx(home.path())
            .arg("--config")
            .arg(&config)
            .args(["--dispatch", "ghost:none:0.1:nothing:here"]),
    );
    assert!(stdout.contains("no route"), "{stdout}");
}

#[test]
fn dispatch_without_secret_refuses_to_start() {
    let (home, config) = workspace();
    let output = cx(home.path())
        .env_remove("CX_SECRET")
        .arg("--config")
        .arg(&config)
        .args(["--dispatch", "hyperx.logger:log:0.3:record:write"])
        .output()
        .expect("run cx-router");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("signing secret"), "{stderr}");
}

#[test]
fn summary_runs_without_secret() {
    let (home, config) = workspace();
    let summary = stdout_of(
        cx(home.path())
            .env_remove("CX_SECRET")
            .arg("--config")
            .arg(&config)
            .arg("--summary"),
    );
    assert!(summary.contains("active routes: 1"), "{summary}");
    assert!(summary.contains("recent CX events:"), "{summary}");
}

#[test]
fn summary_and_dispatch_conflict() {
    let (home, config) = workspace();
    cx(home.path())
        .arg("--config")
        .arg(&config)
        .args(["--summary", "--dispatch", "a:b:0:c:d"])
        .assert()
        .failure();
}
