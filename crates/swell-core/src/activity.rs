//! The append-only activity log.
//!
//! Every producer of activity entries goes through [`ActivityLog::append`],
//! which timestamps the line and enforces size-bounded rotation under an
//! exclusive lock. The log itself stays loose Markdown; the engine only
//! writes entries, it never parses them back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use swell_common::io;
use swell_common::lock::LockedFile;
use swell_common::paths;

use crate::errors::{CoreError, CoreResult};

/// Rotation threshold for the activity log.
const DEFAULT_MAX_BYTES: u64 = 512 * 1024;

/// Handle on the project's activity log.
pub struct ActivityLog {
    path: PathBuf,
    lock_path: PathBuf,
    max_bytes: u64,
    lock_timeout: Duration,
}

impl ActivityLog {
    /// Activity log for the project at `root`.
    pub fn new(root: &Path, lock_timeout: Duration) -> Self {
        Self {
            path: paths::activity_log_path(root),
            lock_path: paths::activity_lock_path(root),
            max_bytes: DEFAULT_MAX_BYTES,
            lock_timeout,
        }
    }

    /// Override the rotation threshold (tests).
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Append a timestamped entry, rotating first when the log has grown
    /// past the threshold.
    pub fn append(&self, entry: &str) -> CoreResult<()> {
        self.rotate_if_needed()?;
        let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let line = format!("- {stamp}: {}", entry.trim());
        io::append_line(&self.path, &line)
            .map_err(|source| CoreError::io(format!("appending {}", self.path.display()), source))
    }

    /// Append a multi-line block (hook output, violation lists) indented
    /// under one timestamped entry.
    pub fn append_block(&self, entry: &str, block: &str) -> CoreResult<()> {
        self.append(entry)?;
        for line in block.lines() {
            io::append_line(&self.path, &format!("  {line}")).map_err(|source| {
                CoreError::io(format!("appending {}", self.path.display()), source)
            })?;
        }
        Ok(())
    }

    fn rotate_if_needed(&self) -> CoreResult<()> {
        let size = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if size < self.max_bytes {
            return Ok(());
        }
        let _lock = LockedFile::exclusive(&self.lock_path, self.lock_timeout)?;
        // Re-check under the lock; another process may have rotated.
        let size = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if size < self.max_bytes {
            return Ok(());
        }
        let rotated = self.path.with_extension("md.1");
        std::fs::rename(&self.path, &rotated)
            .map_err(|source| CoreError::io(format!("rotating {}", self.path.display()), source))?;
        tracing::info!(log = %self.path.display(), "activity log rotated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_creates_timestamped_entries() {
        let td = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(td.path(), Duration::from_secs(1));
        log.append("wave 1 complete").unwrap();
        let raw = std::fs::read_to_string(paths::activity_log_path(td.path())).unwrap();
        assert!(raw.contains("wave 1 complete"));
        assert!(raw.starts_with("- "));
    }

    #[test]
    fn oversized_log_rotates_to_dot_one() {
        let td = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(td.path(), Duration::from_secs(1)).with_max_bytes(64);
        for i in 0..12 {
            log.append(&format!("entry number {i} with some padding")).unwrap();
        }
        let rotated = paths::activity_log_path(td.path()).with_extension("md.1");
        assert!(rotated.exists());
        let live = std::fs::read_to_string(paths::activity_log_path(td.path())).unwrap();
        assert!(live.len() < 512);
    }

    #[test]
    fn append_block_indents_lines() {
        let td = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(td.path(), Duration::from_secs(1));
        log.append_block("hook output", "line one\nline two").unwrap();
        let raw = std::fs::read_to_string(paths::activity_log_path(td.path())).unwrap();
        assert!(raw.contains("  line one\n  line two\n"));
    }
}
