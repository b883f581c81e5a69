//! The process registry: one record per supervised task.
//!
//! Stored as a single JSON document with owner-only permissions, guarded by
//! the registry lock. A parse failure is not fatal: the corrupt file is
//! preserved aside and the watchdog starts over with an empty registry,
//! telling the operator what was kept.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swell_common::io;
use swell_common::lock::LockedFile;
use swell_common::paths;

use crate::errors::{CoreError, CoreResult};

/// How a task's worker runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// A native process group on this host.
    Native,
    /// A container managed by the configured runtime.
    Container,
}

/// Lifecycle state of a process record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Believed alive; verified by every sweep.
    Running,
    /// Explicitly marked complete.
    Completed,
    /// Process or container disappeared without completing (orphan).
    Failed,
    /// Last liveness lookup errored transiently; resolved next sweep.
    Unknown,
}

impl RecordStatus {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Running => "running",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
            RecordStatus::Unknown => "unknown",
        }
    }
}

/// Native-mode subrecord.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NativeProcess {
    /// Process id.
    pub pid: u32,
    /// Process-group id; kill signals target the group.
    pub pgid: i32,
    /// Kernel-reported process start time. Opaque but stable for the
    /// lifetime of the PID; a mismatch on sweep means the PID was recycled.
    pub start_time: String,
    /// Optional environment tag (e.g. `TASK_ID=SW-001`).
    pub env_tag: Option<String>,
}

/// Container resource limits, verbatim from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Memory cap (runtime syntax, e.g. `512m`).
    pub memory: Option<String>,
    /// CPU cap (runtime syntax, e.g. `1.5`).
    pub cpu: Option<String>,
}

/// Container-mode subrecord.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerProcess {
    /// Runtime container id.
    pub container_id: String,
    /// Display name.
    pub container_name: String,
    /// Optional resource limits.
    pub resource_limits: Option<ResourceLimits>,
}

/// Best-effort CPU/memory snapshot taken by the sweep for live records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSnapshot {
    /// CPU usage percent at sample time.
    pub cpu_percent: f32,
    /// Resident memory in bytes.
    pub memory_bytes: u64,
}

/// One supervised task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRecord {
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Command line, stored verbatim for display.
    pub command: String,
    /// Lifecycle state.
    pub status: RecordStatus,
    /// ISO-8601 registration time.
    pub started_at: String,
    /// ISO-8601 completion time, when completed.
    pub completed_at: Option<String>,
    /// Rule tags for later validation of this task's outputs.
    pub constitution_rules: Vec<String>,
    /// Native subrecord, when mode is native.
    pub native: Option<NativeProcess>,
    /// Container subrecord, when mode is container.
    pub container: Option<ContainerProcess>,
    /// Latest resource snapshot for a live record, absent where the
    /// platform does not expose one.
    #[serde(default)]
    pub resources: Option<ResourceSnapshot>,
}

/// The registry document: task id to record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Registry {
    /// Records keyed by task id. At most one record per task.
    pub tasks: BTreeMap<String, ProcessRecord>,
}

/// Registry persistence for one project.
pub struct RegistryStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl RegistryStore {
    /// Store rooted at the project directory.
    pub fn new(root: &Path, lock_timeout: Duration) -> Self {
        Self {
            root: root.to_path_buf(),
            lock_timeout,
        }
    }

    /// Path of the registry document.
    pub fn registry_path(&self) -> PathBuf {
        paths::registry_path(&self.root)
    }

    /// Load the registry. An absent file is an empty registry; a corrupt
    /// file is preserved aside and replaced by an empty registry with a
    /// warning.
    pub fn load(&self) -> CoreResult<Registry> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(Registry::default());
        }
        let raw = io::read_to_string(&path)
            .map_err(|source| CoreError::io(format!("reading {}", path.display()), source))?;
        match serde_json::from_str(&raw) {
            Ok(registry) => Ok(registry),
            Err(err) => {
                let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string();
                match io::preserve_aside(&path, &stamp) {
                    Ok(preserved) => {
                        tracing::warn!(
                            preserved = %preserved.display(),
                            error = %err,
                            "registry failed to parse; starting fresh"
                        );
                        Ok(Registry::default())
                    }
                    Err(source) => Err(CoreError::RegistryCorrupted {
                        path,
                        message: format!("{err}; preserving the file also failed: {source}"),
                    }),
                }
            }
        }
    }

    /// Persist the registry atomically (temp + rename, 0600) under the
    /// registry lock.
    pub fn save(&self, registry: &Registry) -> CoreResult<()> {
        let lock_path = paths::registry_lock_path(&self.root);
        let _lock = LockedFile::exclusive(&lock_path, self.lock_timeout)?;
        let path = self.registry_path();
        let rendered = serde_json::to_string_pretty(registry)
            .map_err(|e| CoreError::parse(format!("serializing registry: {e}")))?;
        io::atomic_replace_private(&path, rendered)
            .map_err(|source| CoreError::io(format!("writing {}", path.display()), source))
    }

    /// Run `mutate` on the loaded registry and persist the result, all
    /// while holding the registry lock. This is the only write path; it
    /// keeps registry writes totally ordered.
    pub fn update<T>(
        &self,
        mutate: impl FnOnce(&mut Registry) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let lock_path = paths::registry_lock_path(&self.root);
        let _lock = LockedFile::exclusive(&lock_path, self.lock_timeout)?;
        let mut registry = self.load()?;
        let out = mutate(&mut registry)?;
        let path = self.registry_path();
        let rendered = serde_json::to_string_pretty(&registry)
            .map_err(|e| CoreError::parse(format!("serializing registry: {e}")))?;
        io::atomic_replace_private(&path, rendered)
            .map_err(|source| CoreError::io(format!("writing {}", path.display()), source))?;
        Ok(out)
    }
}
