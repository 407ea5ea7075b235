//! Integration tests for the `wgfleet` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! and error handling, all without a reachable router.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `wgfleet` binary with env isolation.
///
/// Clears all `WGFLEET_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn wgfleet_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("wgfleet");
    cmd.env("HOME", "/tmp/wgfleet-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/wgfleet-cli-test-nonexistent")
        .env_remove("WGFLEET_PROFILE")
        .env_remove("WGFLEET_HOST")
        .env_remove("WGFLEET_PORT")
        .env_remove("WGFLEET_USERNAME")
        .env_remove("WGFLEET_PASSWORD")
        .env_remove("WGFLEET_OUTPUT")
        .env_remove("WGFLEET_INSECURE")
        .env_remove("WGFLEET_TIMEOUT");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = wgfleet_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    wgfleet_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("WireGuard")
            .and(predicate::str::contains("interfaces"))
            .and(predicate::str::contains("peers"))
            .and(predicate::str::contains("routes"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("monitor")),
    );
}

#[test]
fn test_version_flag() {
    wgfleet_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("wgfleet"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    wgfleet_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    wgfleet_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = wgfleet_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success(), "Expected failure for invalid subcommand");
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_peers_list_without_router() {
    wgfleet_cmd()
        .args(["peers", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No router configured"));
}

#[test]
fn test_unknown_profile_is_reported() {
    wgfleet_cmd()
        .args(["--profile", "nope", "routes", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profile 'nope' not found"));
}

#[test]
fn test_host_without_password_needs_credentials() {
    let output = wgfleet_cmd()
        .args(["--host", "192.0.2.1", "interfaces", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3), "Expected auth exit code");
    let text = combined_output(&output);
    assert!(text.contains("No password configured"), "Unexpected output:\n{text}");
}

#[test]
fn test_invalid_output_format() {
    let output = wgfleet_cmd()
        .args(["--output", "invalid", "peers", "list"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

#[test]
fn test_peer_add_requires_interface() {
    wgfleet_cmd()
        .args(["peers", "add", "AAAA"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--interface"));
}

#[test]
fn test_online_and_offline_conflict() {
    wgfleet_cmd()
        .args(["peers", "list", "--online", "--offline"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_watch_rejects_unknown_topic() {
    wgfleet_cmd()
        .args(["watch", "cpu"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("traffic").and(predicate::str::contains("peers")));
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_path() {
    wgfleet_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_no_config() {
    // Renders the defaults when no config file exists.
    wgfleet_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("online_confirm = 75"));
}

#[test]
fn test_config_show_masks_passwords() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("wgfleet");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[profiles.lab]\nhost = \"10.8.0.1\"\npassword = \"hunter2\"\n",
    )
    .unwrap();

    wgfleet_cmd()
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("10.8.0.1")
                .and(predicate::str::contains("hunter2").not()),
        );
}

// ── Subcommand help discovery ───────────────────────────────────────

#[test]
fn test_peers_subcommands_exist() {
    wgfleet_cmd()
        .args(["peers", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("add"))
                .and(predicate::str::contains("set"))
                .and(predicate::str::contains("remove"))
                .and(predicate::str::contains("enable"))
                .and(predicate::str::contains("disable")),
        );
}

#[test]
fn test_routes_subcommands_exist() {
    wgfleet_cmd()
        .args(["routes", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("add"))
                .and(predicate::str::contains("remove")),
        );
}
