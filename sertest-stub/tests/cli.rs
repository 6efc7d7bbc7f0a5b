use std::fs;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

fn stub_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("ser2net-stub"))
}

#[test]
fn missing_config_flag_is_a_usage_error() {
    stub_cmd()
        .args(["-r", "-d"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("-c <FILE>"));
}

#[test]
fn unreadable_config_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("absent.yaml");
    stub_cmd()
        .args(["-r", "-c"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Ready").not())
        .stderr(predicate::str::contains("read config"));
}

#[test]
fn unix_accepter_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("bad.yaml");
    fs::write(
        &path,
        "connections:\n  - accepter: unix,/tmp/stub.sock\n    peer: stdio\n",
    )
    .expect("write config");

    stub_cmd()
        .args(["-r", "-d", "-c"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("only tcp listeners are supported"));
}

#[test]
fn help_lists_the_daemon_flags() {
    stub_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-ready"))
        .stdout(predicate::str::contains("-c <FILE>"));
}
