//! Command-line surface tests for the `twist` binary.
//!
//! None of these reach a core: every case fails (or succeeds) before the
//! first request is sent.

#![allow(clippy::expect_used, deprecated)]

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `twist` with an isolated environment: no credentials, no endpoint from
/// the caller's shell, and a config directory that holds nothing.
fn twist(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("twist").expect("twist binary should exist");
    cmd.env_remove("TWIST_ENDPOINT")
        .env_remove("TWIST_PROFILE")
        .env_remove("CRED_HPSA")
        .env_remove("CRED_LAB")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path());
    cmd
}

// --- Help and usage ---

#[test]
fn help_lists_every_subcommand() {
    let home = TempDir::new().expect("tempdir");
    let assert = twist(&home).arg("--help").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for sub in ["server", "customer", "policy", "script", "comtest", "ping"] {
        assert!(out.contains(sub), "missing {sub} in help:\n{out}");
    }
}

#[test]
fn no_subcommand_is_a_usage_error() {
    let home = TempDir::new().expect("tempdir");
    twist(&home).assert().code(2);
}

#[test]
fn conflicting_server_references_are_rejected() {
    let home = TempDir::new().expect("tempdir");
    twist(&home)
        .args(["server", "--name", "web01", "--host", "web01.lab"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn customer_needs_exactly_one_mode() {
    let home = TempDir::new().expect("tempdir");
    twist(&home).args(["customer"]).assert().code(2);
    twist(&home)
        .args(["customer", "--list", "acme", "--get", "--name", "web01"])
        .assert()
        .code(2);
}

#[test]
fn script_execute_requires_a_server() {
    let home = TempDir::new().expect("tempdir");
    twist(&home)
        .args(["script", "--script", "restart-snmp", "--execute"])
        .assert()
        .code(2);
}

// --- Credentials ---

#[test]
fn missing_credentials_name_the_variable() {
    let home = TempDir::new().expect("tempdir");
    twist(&home)
        .args(["ping", "--endpoint", "https://core.invalid"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("#- ENV[CRED_HPSA]"));
}

#[test]
fn profile_selects_the_credential_variable() {
    let home = TempDir::new().expect("tempdir");
    twist(&home)
        .args(["ping", "--endpoint", "https://core.invalid", "--profile", "lab"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ENV[CRED_LAB]"));
}

#[test]
fn credentials_without_separator_are_incomplete() {
    let home = TempDir::new().expect("tempdir");
    twist(&home)
        .env("CRED_HPSA", "admin")
        .args(["ping", "--endpoint", "https://core.invalid"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ENV[CRED_HPSA]"));
}

// --- Configuration file ---

#[test]
fn explicit_config_must_exist() {
    let home = TempDir::new().expect("tempdir");
    let missing = home.path().join("nope.yaml");
    twist(&home)
        .arg("ping")
        .arg("--config")
        .arg(&missing)
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("#- "));
}

#[test]
fn unknown_config_keys_are_rejected() {
    let home = TempDir::new().expect("tempdir");
    let path = home.path().join("config.yaml");
    fs::write(&path, "endpoint: https://core.invalid\npassword: hunter2\n").expect("write config");
    twist(&home)
        .arg("ping")
        .arg("--config")
        .arg(&path)
        .assert()
        .code(1);
}

#[test]
fn config_file_supplies_the_profile() {
    let home = TempDir::new().expect("tempdir");
    let path = home.path().join("config.yaml");
    fs::write(&path, "endpoint: https://core.invalid\nprofile: staging\n").expect("write config");
    twist(&home)
        .env_remove("CRED_STAGING")
        .arg("ping")
        .arg("--config")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ENV[CRED_STAGING]"));
}

#[test]
fn malformed_endpoint_fails_before_connecting() {
    let home = TempDir::new().expect("tempdir");
    twist(&home)
        .env("CRED_HPSA", "admin%secret")
        .args(["ping", "--endpoint", "ftp://core.invalid"])
        .assert()
        .code(1);
}

#[test]
fn server_without_reference_is_invalid() {
    let home = TempDir::new().expect("tempdir");
    twist(&home)
        .args(["server", "--endpoint", "https://core.invalid"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("a server reference is required"));
}
