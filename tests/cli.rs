//! End-to-end CLI tests: flag legality and usage failures.
//!
//! Nothing here talks to Discord; every case either fails validation or
//! only prints help.

use assert_cmd::Command;
use predicates::prelude::*;

fn slackport() -> Command {
    let mut cmd = Command::cargo_bin("slackport").unwrap();
    // keep the host environment out of token resolution
    cmd.env_remove("DISCORD_TOKEN");
    cmd.current_dir(tempfile::tempdir().unwrap().keep());
    cmd
}

#[test]
fn test_help_describes_source_modes() {
    slackport()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--src-file"))
        .stdout(predicate::str::contains("--src-dirtree"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_version_prints() {
    slackport()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("slackport"));
}

#[test]
fn test_no_source_mode_fails() {
    slackport()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"))
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_source_modes_are_mutually_exclusive() {
    slackport()
        .args(["--src-file", "day.json", "--src-dir", "channel"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn test_src_file_without_dest_channel_fails() {
    slackport()
        .args(["--src-file", "day.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--dest-channel"));
}

#[test]
fn test_dirtree_with_dest_channel_fails() {
    slackport()
        .args(["--src-dirtree", "export", "--dest-channel", "general"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--dest-channel is not allowed"));
}

#[test]
fn test_channel_file_outside_dirtree_fails() {
    slackport()
        .args(["--src-dir", "channel", "--channel-file", "channels.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--channel-file"));
}

#[test]
fn test_missing_token_fails_with_guidance() {
    slackport()
        .args(["--src-dirtree", "export"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Discord token"));
}
