//! Integration tests for nodal-cli.
//!
//! Every invocation passes `--config` so results do not depend on a user
//! configuration file on the test machine.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Helper to get the path to the `nodal` binary built by cargo.
fn nodal_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nodal"))
}

fn demo_script() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scripts/demo.toml")
}

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap_or_else(|e| panic!("{line}: {e}")))
        .collect()
}

// ---------------------------------------------------------------------------
// `nodal config`
// ---------------------------------------------------------------------------

#[test]
fn cli_config_prints_loaded_values() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "block_size = 64\n");

    let output = nodal_bin()
        .arg("--config")
        .arg(&config)
        .arg("config")
        .output()
        .expect("failed to run nodal config");

    assert!(output.status.success(), "nodal config failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("# loaded from"), "{stdout}");
    assert!(stdout.contains("block_size = 64"), "{stdout}");
    assert!(stdout.contains("sample_rate = 48000"), "{stdout}");
}

#[test]
fn cli_config_write_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "");
    let target = dir.path().join("out").join("engine.toml");

    let write = |force: bool| {
        let mut cmd = nodal_bin();
        cmd.arg("--config")
            .arg(&config)
            .args(["config", "--write", "--output"])
            .arg(&target);
        if force {
            cmd.arg("--force");
        }
        cmd.output().expect("failed to run nodal config --write")
    };

    assert!(write(false).status.success());
    assert!(target.is_file());
    assert!(!write(false).status.success(), "second write should refuse");
    assert!(write(true).status.success());
}

#[test]
fn cli_rejects_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let output = nodal_bin()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("config")
        .output()
        .expect("failed to run nodal");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn cli_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "block_size = 100\n");
    let output = nodal_bin()
        .arg("--config")
        .arg(&config)
        .arg("config")
        .output()
        .expect("failed to run nodal");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("block_size"));
}

// ---------------------------------------------------------------------------
// `nodal run`
// ---------------------------------------------------------------------------

#[test]
fn cli_run_demo_script() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "block_size = 64\nlog_level = \"warn\"\n");

    let output = nodal_bin()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg(demo_script())
        .arg("--strict")
        .output()
        .expect("failed to run nodal run");

    assert!(
        output.status.success(),
        "nodal run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = json_lines(&output.stdout);
    let responses: Vec<&serde_json::Value> =
        lines.iter().filter(|l| l.get("response").is_some()).collect();
    assert_eq!(responses.len(), 12);
    assert!(responses.iter().all(|r| r["response"] == "ok"));

    // Responses come back in execution order; the delay-free requests keep
    // their script order and the delayed delete comes last.
    let ids: Vec<i64> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, (1..=12).collect::<Vec<_>>());

    assert!(lines.iter().any(|l| l["event"] == "move"
        && l["old"] == "/main/amp"
        && l["new"] == "/main/gain_stage"));
    assert!(
        lines
            .iter()
            .any(|l| l["event"] == "delete" && l["path"] == "/main/lfo")
    );
}

#[test]
fn cli_run_reports_failed_requests() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "log_level = \"error\"\n");
    let script = dir.path().join("bad.toml");
    std::fs::write(
        &script,
        "[[request]]\nop = \"delete\"\npath = \"/nowhere\"\n\n[[request]]\nop = \"put\"\npath = \"/main\"\nkind = \"graph\"\n",
    )
    .unwrap();

    let run = |strict: bool| {
        let mut cmd = nodal_bin();
        cmd.arg("--config").arg(&config).arg("run").arg(&script);
        if strict {
            cmd.arg("--strict");
        }
        cmd.output().expect("failed to run nodal run")
    };

    let relaxed = run(false);
    assert!(relaxed.status.success());
    let lines = json_lines(&relaxed.stdout);
    assert_eq!(lines[0]["response"], "error");
    assert_eq!(lines[0]["id"], 1);
    assert!(
        lines[0]["message"]
            .as_str()
            .unwrap()
            .starts_with("resolution error")
    );
    assert_eq!(lines[1]["response"], "ok");

    assert!(!run(true).status.success());
}

#[test]
fn cli_run_rejects_malformed_script() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "");
    let script = dir.path().join("bad.toml");
    std::fs::write(&script, "[[request]]\nop = \"teleport\"\n").unwrap();

    let output = nodal_bin()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg(&script)
        .output()
        .expect("failed to run nodal run");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown op 'teleport'"));
}
