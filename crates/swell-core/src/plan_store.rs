//! Persistence for the wave plan document.
//!
//! Writes are atomic and validated: the document's structural invariants
//! are checked, the previous plan is copied to `plan.json.backup`, the new
//! content lands in a temp file, and a rename commits it, all under the
//! exclusive plan lock. Reads validate too and fall back to the backup; a
//! plan that cannot be recovered is preserved aside with a timestamped
//! suffix and surfaced as [`CoreError::PlanCorrupted`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use swell_common::io;
use swell_common::lock::LockedFile;
use swell_common::paths;
use swell_domain::plan::PlanDocument;

use crate::errors::{CoreError, CoreResult};

/// Transient-read retries before treating a parse failure as corruption.
const READ_RETRIES: u32 = 3;

/// Plan document persistence for one project.
pub struct PlanStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl PlanStore {
    /// Create a store rooted at the project directory.
    pub fn new(root: &Path, lock_timeout: Duration) -> Self {
        Self {
            root: root.to_path_buf(),
            lock_timeout,
        }
    }

    /// Path of the plan document.
    pub fn plan_path(&self) -> PathBuf {
        paths::plan_path(&self.root)
    }

    /// True when a plan document exists.
    pub fn exists(&self) -> bool {
        self.plan_path().exists()
    }

    /// Validate and persist `document`, backing up any prior plan first.
    pub fn save(&self, document: &PlanDocument) -> CoreResult<()> {
        document.validate()?;
        let rendered = document.to_canonical_json();

        let lock_path = paths::plan_lock_path(&self.root);
        let _lock = LockedFile::exclusive(&lock_path, self.lock_timeout)?;

        let plan_path = self.plan_path();
        if plan_path.exists() {
            let backup = paths::plan_backup_path(&self.root);
            std::fs::copy(&plan_path, &backup).map_err(|source| {
                CoreError::io(format!("backing up {}", plan_path.display()), source)
            })?;
        }
        io::atomic_replace(&plan_path, &rendered)
            .map_err(|source| CoreError::io(format!("writing {}", plan_path.display()), source))?;
        tracing::debug!(path = %plan_path.display(), "plan written");
        Ok(())
    }

    /// Load the plan, or `None` when no plan document exists.
    pub fn load_optional(&self) -> CoreResult<Option<PlanDocument>> {
        if !self.exists() {
            return Ok(None);
        }
        self.load().map(Some)
    }

    /// Load and validate the plan document.
    ///
    /// Parse failures are retried briefly (a reader can catch a writer
    /// mid-rename on some filesystems), then the backup is consulted. When
    /// both fail the corrupt file is moved aside and the error tells the
    /// operator where it went.
    pub fn load(&self) -> CoreResult<PlanDocument> {
        let plan_path = self.plan_path();
        let lock_path = paths::plan_lock_path(&self.root);
        let _lock = LockedFile::shared(&lock_path, self.lock_timeout)?;

        let mut last_error = String::new();
        let mut last_raw: Option<String> = None;
        let mut content_moved = false;
        for attempt in 0..READ_RETRIES {
            let raw = io::read_to_string(&plan_path)
                .map_err(|source| CoreError::io(format!("reading {}", plan_path.display()), source))?;
            match parse_validated(&raw) {
                Ok(doc) => return Ok(doc),
                Err(message) => {
                    if last_raw.as_deref().is_some_and(|prev| prev != raw) {
                        content_moved = true;
                    }
                    last_raw = Some(raw);
                    last_error = message;
                    if attempt + 1 < READ_RETRIES {
                        std::thread::sleep(Duration::from_millis(50));
                    }
                }
            }
        }
        if content_moved {
            // The document kept changing under us: a writer is mid-flight,
            // not corruption. Leave the file alone.
            return Err(CoreError::ConcurrentPlanWrite { path: plan_path });
        }

        let backup_path = paths::plan_backup_path(&self.root);
        if backup_path.exists() {
            if let Ok(doc) = read_validated(&backup_path) {
                tracing::warn!(
                    plan = %plan_path.display(),
                    "plan failed to load; recovered from backup"
                );
                return Ok(doc);
            }
        }

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string();
        let preserved = io::preserve_aside(&plan_path, &stamp).ok();
        Err(CoreError::PlanCorrupted {
            path: plan_path,
            preserved,
            message: last_error,
        })
    }
}

fn read_validated(path: &Path) -> Result<PlanDocument, String> {
    let raw = io::read_to_string(path).map_err(|e| e.to_string())?;
    parse_validated(&raw)
}

fn parse_validated(raw: &str) -> Result<PlanDocument, String> {
    let document: PlanDocument =
        serde_json::from_str(raw).map_err(|e| format!("JSON error: {e}"))?;
    document.validate().map_err(|e| e.to_string())?;
    Ok(document)
}

/// JSON Schema for the plan document, for export and editor tooling.
pub fn plan_schema_json() -> String {
    let schema = schemars::schema_for!(PlanDocument);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}
