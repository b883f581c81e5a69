//! Session snapshots and recall.
//!
//! A snapshot captures the session's mental model (progress counters,
//! in-flight tasks, next steps, blockers) as a timestamped JSON document
//! under `.swell/snapshots/`. Recall resolves the latest snapshot through a
//! small indirection file (portable where symlinks are not), parses it, and
//! hands the structured data back for display. Rotation runs before every
//! write and keeps the N most recent documents.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use swell_common::io;
use swell_common::paths;

use crate::errors::{CoreError, CoreResult};

/// Outcome of the most recent rule validation, referenced by snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Whether the validation passed (no blocking violations).
    pub passed: bool,
    /// Error-severity violation count.
    pub errors: usize,
    /// Warning-severity violation count.
    pub warnings: usize,
}

/// A session snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    /// Session identifier.
    pub session_id: String,
    /// ISO-8601 capture timestamp.
    pub timestamp: String,
    /// Current phase, when a plan exists.
    pub phase: Option<String>,
    /// Wave the executor was on.
    pub current_wave: Option<u32>,
    /// Waves already checkpointed.
    pub completed_waves: Vec<u32>,
    /// Task ids the watchdog reports as running.
    pub running_tasks: Vec<String>,
    /// Total tasks in the task list.
    pub tasks_total: usize,
    /// Tasks checked off.
    pub tasks_complete: usize,
    /// Human-curated next steps, when present.
    pub next_steps: Vec<String>,
    /// Human-curated blockers, when present.
    pub blockers: Vec<String>,
    /// Most recent commit hashes, newest first, bounded.
    pub recent_commits: Vec<String>,
    /// Files with working-tree modifications at capture time.
    pub modified_files: Vec<String>,
    /// Latest rule-validation outcome, when one has run.
    pub last_validation: Option<ValidationOutcome>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LatestPointer {
    latest: String,
}

/// Snapshot persistence for one project.
pub struct SnapshotStore {
    dir: PathBuf,
    retain: usize,
}

impl SnapshotStore {
    /// Store for the project at `root`, keeping `retain` snapshots.
    pub fn new(root: &Path, retain: usize) -> Self {
        Self {
            dir: paths::snapshots_dir(root),
            retain: retain.max(1),
        }
    }

    /// Persist `snapshot`, rotating old documents first, and update the
    /// latest pointer. Returns the written path.
    pub fn write(&self, snapshot: &Snapshot) -> CoreResult<PathBuf> {
        self.rotate()?;

        // Fixed-width stamp keeps lexicographic order chronological for
        // rotation.
        let stamp = chrono::DateTime::parse_from_rfc3339(&snapshot.timestamp)
            .map(|t| t.format("%Y%m%dT%H%M%S%3f").to_string())
            .unwrap_or_else(|_| snapshot.timestamp.replace([':', '-', '.'], ""));
        let short_id: String = snapshot.session_id.chars().take(8).collect();
        let name = format!("snapshot-{stamp}-{short_id}.json");
        let path = self.dir.join(&name);

        let rendered = serde_json::to_string_pretty(snapshot)
            .map_err(|e| CoreError::parse(format!("serializing snapshot: {e}")))?;
        io::atomic_replace(&path, rendered)
            .map_err(|source| CoreError::io(format!("writing {}", path.display()), source))?;

        let pointer = serde_json::to_string_pretty(&LatestPointer { latest: name })
            .map_err(|e| CoreError::parse(format!("serializing pointer: {e}")))?;
        let pointer_path = self.dir.join("latest.json");
        io::atomic_replace(&pointer_path, pointer).map_err(|source| {
            CoreError::io(format!("writing {}", pointer_path.display()), source)
        })?;
        Ok(path)
    }

    /// Load the latest snapshot, or `None` when none has been written.
    /// Recall is idempotent and read-only.
    pub fn load_latest(&self) -> CoreResult<Option<Snapshot>> {
        let pointer_path = self.dir.join("latest.json");
        if !pointer_path.exists() {
            return Ok(None);
        }
        let raw = io::read_to_string(&pointer_path).map_err(|source| {
            CoreError::io(format!("reading {}", pointer_path.display()), source)
        })?;
        let pointer: LatestPointer = serde_json::from_str(&raw)
            .map_err(|e| CoreError::parse(format!("parsing snapshot pointer: {e}")))?;

        let path = self.dir.join(&pointer.latest);
        if !path.exists() {
            return Ok(None);
        }
        let raw = io::read_to_string(&path)
            .map_err(|source| CoreError::io(format!("reading {}", path.display()), source))?;
        let snapshot = serde_json::from_str(&raw)
            .map_err(|e| CoreError::parse(format!("parsing {}: {e}", path.display())))?;
        Ok(Some(snapshot))
    }

    /// Delete everything beyond the `retain - 1` newest snapshots, making
    /// room for the one about to be written.
    fn rotate(&self) -> CoreResult<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        let mut snapshots: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .map_err(|source| CoreError::io(format!("listing {}", self.dir.display()), source))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("snapshot-") && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();
        snapshots.sort();
        let keep = self.retain.saturating_sub(1);
        if snapshots.len() <= keep {
            return Ok(());
        }
        let drop_count = snapshots.len() - keep;
        for stale in snapshots.into_iter().take(drop_count) {
            if let Err(err) = std::fs::remove_file(&stale) {
                tracing::warn!(path = %stale.display(), error = %err, "snapshot rotation failed");
            }
        }
        Ok(())
    }
}

/// Extract the bullet items under a `## <heading>` section of a Markdown
/// document. Used for the human-curated "Next Steps" and "Blockers"
/// sections.
pub fn markdown_section_items(contents: &str, heading: &str) -> Vec<String> {
    let mut in_section = false;
    let mut items = Vec::new();
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            in_section = rest.trim().eq_ignore_ascii_case(heading);
            continue;
        }
        if !in_section {
            continue;
        }
        let trimmed = line.trim_start();
        if let Some(item) = trimmed.strip_prefix("- ") {
            items.push(item.trim().to_string());
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, timestamp: &str) -> Snapshot {
        Snapshot {
            session_id: id.to_string(),
            timestamp: timestamp.to_string(),
            phase: Some("phase-1".to_string()),
            current_wave: Some(2),
            completed_waves: vec![1],
            running_tasks: vec!["T003".to_string()],
            tasks_total: 5,
            tasks_complete: 2,
            next_steps: vec!["finish wave 2".to_string()],
            blockers: Vec::new(),
            recent_commits: vec!["abc123".to_string()],
            modified_files: vec!["src/lib.rs".to_string()],
            last_validation: Some(ValidationOutcome {
                passed: true,
                errors: 0,
                warnings: 1,
            }),
        }
    }

    #[test]
    fn write_then_recall_round_trips() {
        let td = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(td.path(), 20);
        let snap = snapshot("0f9a2c11", "2026-08-01T10:00:00Z");
        store.write(&snap).unwrap();
        let loaded = store.load_latest().unwrap().unwrap();
        assert_eq!(loaded, snap);
        // Recall twice: idempotent.
        assert_eq!(store.load_latest().unwrap().unwrap(), snap);
    }

    #[test]
    fn recall_without_snapshots_is_none() {
        let td = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(td.path(), 20);
        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn rotation_keeps_the_newest_n() {
        let td = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(td.path(), 3);
        for hour in 0..6 {
            let snap = snapshot("deadbeef", &format!("2026-08-01T0{hour}:00:00Z"));
            store.write(&snap).unwrap();
        }
        let count = std::fs::read_dir(paths::snapshots_dir(td.path()))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("snapshot-")
            })
            .count();
        assert_eq!(count, 3);
        // The latest pointer still resolves after rotation.
        let loaded = store.load_latest().unwrap().unwrap();
        assert_eq!(loaded.timestamp, "2026-08-01T05:00:00Z");
    }

    #[test]
    fn markdown_sections_parse_bullets() {
        let doc = "\
# Notes

## Next Steps
- ship wave 3
- review T007

## Blockers
- waiting on credentials

## Other
- ignored
";
        assert_eq!(
            markdown_section_items(doc, "Next Steps"),
            vec!["ship wave 3", "review T007"]
        );
        assert_eq!(
            markdown_section_items(doc, "Blockers"),
            vec!["waiting on credentials"]
        );
        assert!(markdown_section_items(doc, "Missing").is_empty());
    }
}
