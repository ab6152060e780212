//! CLI integration tests
//!
//! Tests the kforward CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;

fn kforward() -> Command {
    let mut cmd = Command::cargo_bin("kforward")
        .expect("Failed to locate kforward binary - ensure it's built before running tests");
    cmd.env_remove("KFORWARD_SERVER")
        .env_remove("KFORWARD_TOKEN")
        .env_remove("KFORWARD_NAMESPACE");
    cmd
}

const TEMPLATE: &str = r#"
name = "backend"
description = "Database and cache"
tags = ["dev"]

[[forwards]]
name = "db"
target = { kind = "pod", name = "postgres-0" }
remote_port = 5432
local_port = 15432

[[forwards]]
name = "api"
target = { kind = "service", name = "api" }
namespace = "staging"
remote_port = 80
"#;

#[test]
fn test_cli_help() {
    kforward()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("kforward"))
        .stdout(predicate::str::contains("Kubernetes port-forward manager"));
}

#[test]
fn test_cli_version() {
    kforward()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("kforward"));
}

#[test]
fn test_cli_forward_help() {
    kforward()
        .args(["forward", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--server"))
        .stdout(predicate::str::contains("LOCAL:REMOTE"));
}

#[test]
fn test_cli_unknown_command() {
    kforward()
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_cli_forward_requires_server() {
    kforward()
        .args(["forward", "pod/web-0", "8080:80"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--server"));
}

#[test]
fn test_cli_forward_rejects_bad_target() {
    kforward()
        .args([
            "forward",
            "deploy/web",
            "8080:80",
            "--server",
            "https://127.0.0.1:6443",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported resource type"));
}

#[test]
fn test_cli_run_missing_template() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        format!("templates_dir = {:?}\n", dir.path().join("templates")),
    )
    .unwrap();

    kforward()
        .args(["run", "nope", "--server", "https://127.0.0.1:6443", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Template 'nope' not found"));
}

#[test]
fn test_cli_config_init_and_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    kforward()
        .args(["config", "init", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));
    assert!(config.exists());

    kforward()
        .args(["config", "init", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));

    kforward()
        .args(["config", "show", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("[forward]"))
        .stdout(predicate::str::contains("max_attempts = 10"));
}

#[test]
fn test_cli_config_show_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[forward\n").unwrap();

    kforward()
        .args(["config", "show", "--config"])
        .arg(&config)
        .assert()
        .failure();
}

#[test]
fn test_cli_templates_list_and_show() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("backend.toml"), TEMPLATE).unwrap();

    kforward()
        .args(["templates", "list", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("backend"))
        .stdout(predicate::str::contains("dev"));

    kforward()
        .args(["templates", "show", "backend", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Template: backend"))
        .stdout(predicate::str::contains("pod/postgres-0"))
        .stdout(predicate::str::contains("15432:5432"))
        .stdout(predicate::str::contains("svc/api"));
}

#[test]
fn test_cli_templates_list_empty() {
    let dir = tempfile::tempdir().unwrap();

    kforward()
        .args(["templates", "list", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No templates found"));
}
