#![allow(deprecated)] // assert_cmd::Command::cargo_bin is deprecated but replacement requires nightly

//! Integration tests for the command-line interface

use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn updater_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("screenpack-updater").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn write_pack(contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("system.def");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

fn backup_of(path: &std::path::Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

// ============================================================================
// Flags
// ============================================================================

#[test]
fn help_flag() {
    updater_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("system.def"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn print_rules_shows_builtin_table() {
    updater_cmd()
        .arg("--print-rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("[[section_renames]]"))
        .stdout(predicate::str::contains("target_version"));
}

#[test]
fn no_path_without_terminal_prints_usage() {
    updater_cmd()
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// ============================================================================
// Patching
// ============================================================================

#[test]
fn patches_file_and_writes_backup() {
    let (_dir, path) = write_pack("[Info]\nname = MyScreenpack\n");

    updater_cmd()
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("patched (no ikemenversion entry in [Info])"))
        .stdout(predicate::str::contains("Backup:"));

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "[Info]\nname = MyScreenpack\nikemenversion = 1.0\n"
    );
    assert_eq!(
        fs::read_to_string(backup_of(&path)).unwrap(),
        "[Info]\nname = MyScreenpack\n"
    );
}

#[test]
fn already_patched_file_is_left_alone() {
    let (_dir, path) = write_pack("[Info]\nikemenversion = 1.0\n");

    updater_cmd()
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("no changes made"));

    assert!(!backup_of(&path).exists());
}

#[test]
fn dry_run_writes_nothing() {
    let input = "[VS Screen]\np2.accept.key = a\n";
    let (_dir, path) = write_pack(input);

    updater_cmd()
        .args(["--dry-run", "--diff"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN"))
        .stdout(predicate::str::contains("deleted p2.accept.key"))
        .stdout(predicate::str::contains("+ikemenversion = 1.0"));

    assert_eq!(fs::read_to_string(&path).unwrap(), input);
    assert!(!backup_of(&path).exists());
}

#[test]
fn stdout_mode_prints_patched_text() {
    let input = "[Menu Info]\nmenu.bg.cursor.anim = 10\n";
    let (_dir, path) = write_pack(input);

    updater_cmd()
        .arg("--stdout")
        .arg(&path)
        .assert()
        .success()
        .stdout(
            "[Pause Menu]\nmenu.item.bg.cursor.anim = 10\n[Info]\nikemenversion = 1.0\n",
        );

    assert_eq!(fs::read_to_string(&path).unwrap(), input);
}

#[test]
fn duplicate_info_is_warned_on_stderr() {
    let (_dir, path) = write_pack("[Info]\n[Info]\n");

    updater_cmd()
        .arg("--stdout")
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("[Info]"));
}

#[test]
fn missing_file_fails() {
    let dir = TempDir::new().unwrap();

    updater_cmd()
        .arg(dir.path().join("system.def"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn invalid_utf8_fails_without_backup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("system.def");
    fs::write(&path, b"[Info]\nname = \xff\n").unwrap();

    updater_cmd()
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to decode"));

    assert!(!backup_of(&path).exists());
}

// ============================================================================
// --rules
// ============================================================================

#[test]
fn custom_rules_file() {
    let (dir, path) = write_pack("[Info]\nikemenversion = 1.0\n[Fight]\nold.key = 1\n");
    let rules = dir.path().join("rules.toml");
    fs::write(
        &rules,
        r#"
[meta]
name = "next"
target_version = "1.1"

[[deprecated_keys]]
section = "fight"
keys = ["old.key"]
"#,
    )
    .unwrap();

    updater_cmd()
        .arg("--rules")
        .arg(&rules)
        .arg("--stdout")
        .arg(&path)
        .assert()
        .success()
        .stdout("[Info]\nikemenversion = 1.1\n[Fight]\n");
}

#[test]
fn broken_rules_file_fails() {
    let (dir, path) = write_pack("[Info]\n");
    let rules = dir.path().join("rules.toml");
    fs::write(&rules, "[meta\n").unwrap();

    updater_cmd()
        .arg("--rules")
        .arg(&rules)
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not load rules"));

    assert_eq!(fs::read_to_string(&path).unwrap(), "[Info]\n");
}
