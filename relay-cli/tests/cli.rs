//! End-to-end tests of the `tunecast` binary. None of them needs a live
//! relay.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn tunecast(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tunecast").unwrap();
    cmd.arg("--data-dir").arg(data_dir).env_remove("RUST_LOG");
    cmd
}

/// Generate a key file and return (path, public key hex).
fn keygen(data_dir: &Path) -> (std::path::PathBuf, String) {
    let key_path = data_dir.join("me.key");
    let output = tunecast(data_dir)
        .args(["keygen", "--output"])
        .arg(&key_path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let pubkey = stdout
        .lines()
        .find_map(|l| l.strip_prefix("Public key: "))
        .unwrap()
        .trim()
        .to_string();
    (key_path, pubkey)
}

// =========================================================================
// Basics
// =========================================================================

#[test]
fn help_lists_commands() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("query"));
}

#[test]
fn init_writes_config_once() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("wss://"));
    assert!(dir.path().join("config.toml").exists());

    tunecast(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn keygen_prints_keys() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .arg("keygen")
        .assert()
        .success()
        .stdout(predicate::str::is_match("Public key: [0-9a-f]{64}").unwrap())
        .stdout(predicate::str::is_match("Secret key: [0-9a-f]{64}").unwrap());
}

// =========================================================================
// Session lifecycle
// =========================================================================

#[test]
fn whoami_before_login() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in"));
}

#[test]
fn local_login_whoami_logout() {
    let dir = tempdir().unwrap();
    let (key_path, pubkey) = keygen(dir.path());

    tunecast(dir.path())
        .args(["login", "--name", "The Host", "--key-file"])
        .arg(&key_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(pubkey.as_str()));

    tunecast(dir.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains(pubkey.as_str()))
        .stdout(predicate::str::contains("The Host"))
        .stdout(predicate::str::contains("local key"));

    tunecast(dir.path())
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));

    tunecast(dir.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in"));
    assert!(!dir.path().join("identity.key").exists());
}

#[cfg(unix)]
#[test]
fn session_files_are_private() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempdir().unwrap();
    let (key_path, _) = keygen(dir.path());
    tunecast(dir.path())
        .args(["login", "--key-file"])
        .arg(&key_path)
        .assert()
        .success();

    for file in ["session.json", "identity.key"] {
        let mode = std::fs::metadata(dir.path().join(file))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600, "{} should be 0600", file);
    }
}

#[test]
fn login_needs_a_method() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .arg("login")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--connect"));
}

#[test]
fn login_rejects_two_methods() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .args(["login", "--connect", "--bunker", "bunker://x"])
        .assert()
        .failure();
}

#[test]
fn malformed_bunker_uri_fails() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .args(["login", "--bunker", "https://example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Remote signer login failed"));
    assert!(!dir.path().join("session.json").exists());
}

// =========================================================================
// Relay commands
// =========================================================================

#[test]
fn publish_requires_login() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .args(["publish", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not logged in"));
}

#[test]
fn invalid_relay_flag_fails() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .args(["--relay", "http://example.com", "query", "--kind", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid relay"));
}

#[test]
fn query_with_unreachable_relay_finds_nothing() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "connect_timeout_ms = 500\ncollect_timeout_ms = 500\n\n[retry]\nmax_attempts = 1\n",
    )
    .unwrap();

    tunecast(dir.path())
        .args(["--relay", "ws://127.0.0.1:9", "query", "--kind", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No events found"));
}

#[test]
fn delete_rejects_bad_ids() {
    let dir = tempdir().unwrap();
    tunecast(dir.path())
        .args(["delete", "not-an-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid event id"));
}
