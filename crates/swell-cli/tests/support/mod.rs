//! Shared helpers for CLI integration tests.

use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;

/// A `swell` invocation rooted in `dir`.
pub fn swell(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("swell").expect("swell binary builds");
    cmd.current_dir(dir);
    cmd.env_remove("RUST_LOG");
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Initialize a git repository with an identity, so checkpoint commits
/// work.
pub fn git_init(dir: &Path) {
    run_git(dir, &["init", "-q"]);
    run_git(dir, &["config", "user.email", "swell-tests@example.com"]);
    run_git(dir, &["config", "user.name", "Swell Tests"]);
}

/// Run a git command, panicking on failure.
pub fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git runs");
    assert!(status.success(), "git {args:?} failed");
}

/// Write a file under `dir`, creating parents.
pub fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// A config that keeps executor waits short for tests.
pub fn fast_config(dir: &Path) {
    write(
        dir,
        ".swell/config.json",
        r#"{
  "executor": {
    "poll_interval_ms": 100,
    "quiet_period_ms": 0,
    "wave_timeout_secs": 2
  }
}
"#,
    );
}
