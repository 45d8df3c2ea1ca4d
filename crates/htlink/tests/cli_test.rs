//! Integration tests for the `htlink` CLI binary.
//!
//! Argument parsing, help, completions and config handling run without any
//! device; the rest talk to a simulated heat pump on loopback.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use assert_cmd::cargo::cargo_bin_cmd;
use htlink_proto::Register;
use htlink_proto::sim::{SimDevice, SimServer};
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

const NO_CONFIG_HOME: &str = "/tmp/htlink-cli-test-nonexistent";

/// Build a [`Command`] for the `htlink` binary with env isolation.
///
/// Clears all `HTLINK_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn htlink_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("htlink");
    cmd.env("HOME", NO_CONFIG_HOME)
        .env("XDG_CONFIG_HOME", NO_CONFIG_HOME)
        .env_remove("HTLINK_PROFILE")
        .env_remove("HTLINK_HOST")
        .env_remove("HTLINK_PORT")
        .env_remove("HTLINK_TIMEOUT")
        .env_remove("HTLINK_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

async fn serve_device() -> (SimDevice, SimServer) {
    let device = SimDevice::new()
        .with_register(Register::mp(0), 75)
        .with_register(Register::mp(3), 352)
        .with_register(Register::mp(16), 1)
        .with_register(Register::sp(69), 210)
        .with_register(Register::sp(13), 1);
    let server = device.serve().await.unwrap();
    (device, server)
}

/// Run the binary off the async runtime so the simulated device keeps serving.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.timeout(Duration::from_secs(20)).output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = htlink_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    htlink_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("heat pump")
            .and(predicate::str::contains("read"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("write")),
    );
}

#[test]
fn test_version_flag() {
    htlink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("htlink"));
}

#[test]
fn test_invalid_subcommand() {
    htlink_cmd()
        .arg("defrost")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    htlink_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    htlink_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("htlink"));
}

// ── Catalog ─────────────────────────────────────────────────────────

#[test]
fn test_params_plain_lists_ids() {
    htlink_cmd()
        .args(["params", "--output", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("temp_aussen")
                .and(predicate::str::contains("hkr_soll_raum"))
                .and(predicate::str::contains("betriebsart")),
        );
}

#[test]
fn test_params_writable_filter() {
    htlink_cmd()
        .args(["params", "--writable", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hkr_soll_raum").and(predicate::str::contains("temp_aussen").not()));
}

#[test]
fn test_params_bad_class_is_usage_error() {
    htlink_cmd()
        .args(["params", "--class", "sideways"])
        .assert()
        .failure()
        .code(2);
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_read_without_config_fails() {
    let output = htlink_cmd().arg("read").output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    let text = combined_output(&output).to_lowercase();
    assert!(text.contains("config"), "Expected config hint in output:\n{text}");
}

#[test]
fn test_config_path() {
    htlink_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_without_file() {
    htlink_cmd()
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"profiles\""));
}

#[test]
fn test_config_use_unknown_profile() {
    htlink_cmd()
        .args(["config", "use", "attic"])
        .assert()
        .failure()
        .code(4);
}

#[test]
fn test_unknown_profile_flag() {
    htlink_cmd()
        .args(["--profile", "attic", "read"])
        .assert()
        .failure()
        .code(4);
}

/// Write a config file under a fresh `XDG_CONFIG_HOME`.
fn config_home(toml: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("htlink");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), toml).unwrap();
    dir
}

const TWO_PROFILES: &str = r#"
default_profile = "home"

[profiles.home]
host = "192.168.1.40"

[profiles.attic]
host = "192.168.1.41"
port = 2000
"#;

#[test]
fn test_config_profiles_marks_default() {
    let home = config_home(TWO_PROFILES);
    htlink_cmd()
        .env("XDG_CONFIG_HOME", home.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("home *")
                .and(predicate::str::contains("attic  192.168.1.41:2000")),
        );
}

#[test]
fn test_config_use_switches_default() {
    let home = config_home(TWO_PROFILES);
    htlink_cmd()
        .env("XDG_CONFIG_HOME", home.path())
        .args(["config", "use", "attic"])
        .assert()
        .success();

    let saved = std::fs::read_to_string(home.path().join("htlink/config.toml")).unwrap();
    assert!(saved.contains("default_profile = \"attic\""), "{saved}");
}

// ── Against a simulated heat pump ───────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_read_plain_from_device() {
    let (device, server) = serve_device().await;
    let port = server.addr().port().to_string();

    let mut cmd = htlink_cmd();
    cmd.args(["--host", "127.0.0.1", "--port", &port, "-o", "plain"])
        .args(["read", "temp_aussen,temp_vorlauf,hkr_soll_raum"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("temp_aussen=7.5"), "{stdout}");
    assert!(stdout.contains("temp_vorlauf=35.2"), "{stdout}");
    assert!(stdout.contains("hkr_soll_raum=21.0"), "{stdout}");
    assert_eq!(device.logouts(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_unreachable_device() {
    let (_device, server) = serve_device().await;
    let port = server.addr().port().to_string();
    drop(server);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut cmd = htlink_cmd();
    cmd.args(["--host", "127.0.0.1", "--port", &port, "--timeout", "2", "read", "temp_aussen"]);
    let output = run(cmd).await;

    assert!(!output.status.success());
    let code = output.status.code().unwrap();
    assert!(code == 7 || code == 8, "unexpected exit code {code}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_write_without_permission() {
    let (device, server) = serve_device().await;
    let port = server.addr().port().to_string();

    let mut cmd = htlink_cmd();
    cmd.args(["--host", "127.0.0.1", "--port", &port, "--yes"])
        .args(["write", "hkr_soll_raum", "21.5"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(5), "{}", combined_output(&output));
    assert_eq!(device.connections(), 0);
    assert_eq!(device.register(Register::sp(69)), Some(210));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_write_out_of_range_is_rejected_locally() {
    let (device, server) = serve_device().await;
    let port = server.addr().port().to_string();

    let mut cmd = htlink_cmd();
    cmd.args(["--host", "127.0.0.1", "--port", &port, "--yes"])
        .args(["write", "hkr_soll_raum", "40"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(2), "{}", combined_output(&output));
    assert_eq!(device.connections(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_write_with_permitted_profile() {
    let (device, server) = serve_device().await;
    let port = server.addr().port().to_string();

    let mut cmd = htlink_cmd();
    cmd.env("HTLINK_PROFILES__DEFAULT__HOST", "127.0.0.1")
        .env("HTLINK_PROFILES__DEFAULT__PORT", &port)
        .env("HTLINK_PROFILES__DEFAULT__WRITE_ENABLED", "true")
        .args(["--yes", "-o", "plain", "write", "hkr_soll_raum", "21.5"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "21.5");
    assert_eq!(device.register(Register::sp(69)), Some(215));
    assert_eq!(device.writes(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_write_requires_yes_when_not_interactive() {
    let (device, server) = serve_device().await;
    let port = server.addr().port().to_string();

    let mut cmd = htlink_cmd();
    cmd.env("HTLINK_PROFILES__DEFAULT__HOST", "127.0.0.1")
        .env("HTLINK_PROFILES__DEFAULT__PORT", &port)
        .env("HTLINK_PROFILES__DEFAULT__WRITE_ENABLED", "true")
        .args(["write", "betriebsart", "cooling"])
        .write_stdin("");
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(2), "{}", combined_output(&output));
    assert_eq!(device.writes(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_clock_get() {
    let (_device, server) = serve_device().await;
    let port = server.addr().port().to_string();

    let mut cmd = htlink_cmd();
    cmd.args(["--host", "127.0.0.1", "--port", &port, "-o", "plain", "clock", "get"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "2024-01-01T12:00:00"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watch_stops_after_count() {
    let (device, server) = serve_device().await;
    let port = server.addr().port().to_string();

    let mut cmd = htlink_cmd();
    cmd.args(["--host", "127.0.0.1", "--port", &port, "-o", "plain"])
        .args(["watch", "temp_aussen", "--interval", "100ms", "--count", "2"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("temp_aussen=7.5").count(), 2, "{stdout}");
    assert!(device.logins() >= 2);
}
