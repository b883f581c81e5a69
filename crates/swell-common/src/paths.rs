//! Canonical `.swell/` path builders.
//!
//! All engine state lives under a single `.swell/` directory at the project
//! root. Lock files are sidecars under `.swell/locks/` so atomic renames of
//! the documents they guard never invalidate a held lock.

use std::path::{Path, PathBuf};

/// The engine state directory: `<root>/.swell`.
pub fn swell_dir(root: &Path) -> PathBuf {
    root.join(".swell")
}

/// The wave plan document.
pub fn plan_path(root: &Path) -> PathBuf {
    swell_dir(root).join("plan.json")
}

/// Backup of the previous wave plan.
pub fn plan_backup_path(root: &Path) -> PathBuf {
    swell_dir(root).join("plan.json.backup")
}

/// The watchdog's process registry.
pub fn registry_path(root: &Path) -> PathBuf {
    swell_dir(root).join("registry.json")
}

/// The wave executor's progress state.
pub fn executor_state_path(root: &Path) -> PathBuf {
    swell_dir(root).join("executor_state.json")
}

/// The regenerated progress artifact (Markdown).
pub fn progress_path(root: &Path) -> PathBuf {
    swell_dir(root).join("progress.md")
}

/// The append-only activity log (Markdown).
pub fn activity_log_path(root: &Path) -> PathBuf {
    swell_dir(root).join("activity.md")
}

/// Directory holding session snapshots.
pub fn snapshots_dir(root: &Path) -> PathBuf {
    swell_dir(root).join("snapshots")
}

/// The engine configuration document.
pub fn config_path(root: &Path) -> PathBuf {
    swell_dir(root).join("config.json")
}

/// Outcome of the most recent rule validation, written by the checkpoint
/// gate and read back by snapshot capture.
pub fn last_validation_path(root: &Path) -> PathBuf {
    swell_dir(root).join("last_validation.json")
}

/// Directory holding advisory lock sidecars.
pub fn locks_dir(root: &Path) -> PathBuf {
    swell_dir(root).join("locks")
}

/// Lock sidecar guarding the plan document.
pub fn plan_lock_path(root: &Path) -> PathBuf {
    locks_dir(root).join("plan.lock")
}

/// Lock sidecar guarding the process registry.
pub fn registry_lock_path(root: &Path) -> PathBuf {
    locks_dir(root).join("registry.lock")
}

/// Lock sidecar serializing task-list reads and writes.
pub fn task_list_lock_path(root: &Path) -> PathBuf {
    locks_dir(root).join("tasklist.lock")
}

/// Lock sidecar guarding activity-log rotation.
pub fn activity_lock_path(root: &Path) -> PathBuf {
    locks_dir(root).join("activity.lock")
}

/// Singleton lock held by the watchdog sweep daemon.
pub fn watchdog_lock_path(root: &Path) -> PathBuf {
    locks_dir(root).join("watchdog.lock")
}
