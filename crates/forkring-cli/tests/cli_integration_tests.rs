//! CLI integration tests for forkring
//!
//! Tests the forkring CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command with its config directory isolated in `config_dir`
#[allow(deprecated)]
fn forkring_cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("forkring").unwrap();
    cmd.env("FORKRING_CONFIG_DIR", config_dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_config_path_uses_override() {
    let dir = TempDir::new().unwrap();

    forkring_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(
            dir.path().to_string_lossy().to_string(),
        ));
}

#[test]
fn test_config_set_get_and_reset() {
    let dir = TempDir::new().unwrap();

    forkring_cmd(&dir)
        .args(["config", "set", "ring.philosophers", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set ring.philosophers = 7"));
    assert!(dir.path().join("config.toml").exists());

    forkring_cmd(&dir)
        .args(["config", "get", "ring.philosophers"])
        .assert()
        .success()
        .stdout(predicate::eq("7\n"));

    forkring_cmd(&dir)
        .args(["config", "reset"])
        .assert()
        .success();

    forkring_cmd(&dir)
        .args(["config", "get", "ring.philosophers"])
        .assert()
        .success()
        .stdout(predicate::eq("5\n"));
}

#[test]
fn test_config_show_lists_keys() {
    let dir = TempDir::new().unwrap();

    forkring_cmd(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ring.orientation = lowest_id"))
        .stdout(predicate::str::contains("protocol.deferral = fifo"))
        .stdout(predicate::str::contains("simulation.seed = 1"));
}

#[test]
fn test_config_rejects_unknown_key() {
    let dir = TempDir::new().unwrap();

    forkring_cmd(&dir)
        .args(["config", "set", "ring.size", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_run_until_quota() {
    let dir = TempDir::new().unwrap();

    forkring_cmd(&dir)
        .args([
            "run",
            "-n",
            "3",
            "--meals",
            "2",
            "--think-max-ms",
            "5",
            "--seed",
            "4",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("P0 eating (meal 2)"))
        .stdout(predicate::str::contains("\t\tP2 eating (meal 2)"))
        .stdout(predicate::str::contains("6 meals"));
}

#[test]
fn test_run_rejects_inverted_think_range() {
    let dir = TempDir::new().unwrap();

    forkring_cmd(&dir)
        .args([
            "run",
            "--meals",
            "1",
            "--think-min-ms",
            "50",
            "--think-max-ms",
            "10",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[E600]"))
        .stderr(predicate::str::contains("forkring config show"));
}

#[test]
fn test_run_json_report() {
    let dir = TempDir::new().unwrap();

    let output = forkring_cmd(&dir)
        .args([
            "run",
            "-n",
            "4",
            "--meals",
            "3",
            "--think-max-ms",
            "5",
            "--deferral",
            "lifo",
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let philosophers = report["philosophers"].as_array().unwrap();
    assert_eq!(philosophers.len(), 4);
    assert!(philosophers.iter().all(|p| p["meals"] == 3));
}

#[test]
fn test_simulate_reaches_meals() {
    let dir = TempDir::new().unwrap();

    forkring_cmd(&dir)
        .args(["simulate", "-n", "4", "--min-meals", "3", "--seed", "7", "--trace", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Simulation (seed 7): 4 philosophers"))
        .stdout(predicate::str::contains("becomes hungry"));
}

#[test]
fn test_simulate_rejects_cyclic_owners() {
    let dir = TempDir::new().unwrap();

    forkring_cmd(&dir)
        .args(["simulate", "-n", "3", "--owners", "2,0,1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle"));
}

#[test]
fn test_layout_text() {
    let dir = TempDir::new().unwrap();

    forkring_cmd(&dir)
        .args(["layout", "-n", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("F0  P2 - P0  starts with P0"))
        .stdout(predicate::str::contains("P2 [thinking]"));
}

#[test]
fn test_layout_single_philosopher_json() {
    let dir = TempDir::new().unwrap();

    let output = forkring_cmd(&dir)
        .args(["layout", "-n", "3", "--philosopher", "0", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let forks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let pair = forks[0].as_array().unwrap();
    assert_eq!(pair.len(), 2);
    assert_eq!(pair[0]["held_by_me"], true);
    assert_eq!(pair[0]["dirty"], true);
}
