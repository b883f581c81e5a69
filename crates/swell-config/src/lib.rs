//! Configuration management for Swell.
//!
//! Configuration lives at `.swell/config.json`. Every field has a default so
//! an absent file means "all defaults"; a present file may set any subset.
//! Unknown keys are tolerated on read and never emitted on write.
//!
//! No hidden singletons: callers load a [`Config`] once per invocation and
//! pass it into each entry point.

#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configuration load failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file exists but is not valid JSON for the schema.
    #[error("parsing {path}: {message}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Parse error detail.
        message: String,
    },
}

/// Paths the engine reads and writes, relative to the project root unless
/// absolute.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// The shared Markdown task list.
    pub task_list: PathBuf,
    /// The rule document ("constitution").
    pub rule_doc: PathBuf,
    /// Optional pre-compaction hook executable.
    pub pre_compaction_hook: Option<PathBuf>,
    /// Sidecar files the context-budget monitor sizes up.
    pub context_sidecars: Vec<PathBuf>,
    /// Optional JSON state file naming active agents/personas.
    pub persona_state: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            task_list: PathBuf::from("TASKS.md"),
            rule_doc: PathBuf::from("CONSTITUTION.md"),
            pre_compaction_hook: None,
            context_sidecars: vec![PathBuf::from(".swell/activity.md")],
            persona_state: None,
        }
    }
}

/// Wave executor and checkpoint gate tuning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Handshake poll interval, in milliseconds.
    pub poll_interval_ms: u64,
    /// Quiet period the task list must hold stable before a wave is
    /// considered handed off, in milliseconds.
    pub quiet_period_ms: u64,
    /// Overall per-wave handshake timeout, in seconds.
    pub wave_timeout_secs: u64,
    /// Whether a missing rule document refuses to run (`true`) or merely
    /// warns and skips rule validation (`false`).
    pub enforcement_required: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            quiet_period_ms: 3_000,
            wave_timeout_secs: 1_800,
            enforcement_required: false,
        }
    }
}

/// Watchdog daemon tuning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Sweep interval, in seconds.
    pub sweep_interval_secs: u64,
    /// Grace period between the graceful and forceful kill signals, in
    /// seconds.
    pub kill_grace_secs: u64,
    /// Container runtime program satisfying the inspect/stop contract.
    pub container_runtime: String,
    /// Bounded timeout handed to the container stop operation, in seconds.
    pub container_stop_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            kill_grace_secs: 5,
            container_runtime: "docker".to_string(),
            container_stop_secs: 10,
        }
    }
}

/// Context-budget monitor tuning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Context window size, in tokens.
    pub window_tokens: u64,
    /// Per-persona token overhead added to the estimate.
    pub persona_overhead_tokens: u64,
    /// Persona count at which pre-compaction triggers regardless of zone.
    pub persona_trigger: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_tokens: 200_000,
            persona_overhead_tokens: 2_000,
            persona_trigger: 5,
        }
    }
}

/// Snapshot retention tuning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Number of most-recent snapshots retained.
    pub retain: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { retain: 20 }
    }
}

/// The full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Config {
    /// File locations.
    pub paths: PathsConfig,
    /// Executor and gate tuning.
    pub executor: ExecutorConfig,
    /// Watchdog tuning.
    pub watchdog: WatchdogConfig,
    /// Context-budget monitor tuning.
    pub context: ContextConfig,
    /// Snapshot retention.
    pub snapshots: SnapshotConfig,
    /// Advisory-lock acquisition timeout, in seconds.
    pub lock_timeout_secs: u64,
}

impl Config {
    /// Load configuration for the project at `root`.
    ///
    /// An absent `.swell/config.json` yields all defaults.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = swell_common::paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = swell_common::io::read_to_string(&path)
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|err| ConfigError::Parse {
            path,
            message: err.to_string(),
        })
    }

    /// Lock acquisition timeout as a `Duration`.
    pub fn lock_timeout(&self) -> Duration {
        let secs = if self.lock_timeout_secs == 0 {
            5
        } else {
            self.lock_timeout_secs
        };
        Duration::from_secs(secs)
    }

    /// Handshake poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.executor.poll_interval_ms.max(100))
    }

    /// Handshake quiet period as a `Duration`.
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.executor.quiet_period_ms)
    }

    /// Per-wave handshake timeout as a `Duration`.
    pub fn wave_timeout(&self) -> Duration {
        Duration::from_secs(self.executor.wave_timeout_secs)
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(&self, root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }

    /// The resolved task-list path.
    pub fn task_list_path(&self, root: &Path) -> PathBuf {
        self.resolve(root, &self.paths.task_list)
    }

    /// The resolved rule-document path.
    pub fn rule_doc_path(&self, root: &Path) -> PathBuf {
        self.resolve(root, &self.paths.rule_doc)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            executor: ExecutorConfig::default(),
            watchdog: WatchdogConfig::default(),
            context: ContextConfig::default(),
            snapshots: SnapshotConfig::default(),
            lock_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let td = tempfile::tempdir().unwrap();
        let config = Config::load(td.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let td = tempfile::tempdir().unwrap();
        let path = swell_common::paths::config_path(td.path());
        swell_common::io::atomic_replace(
            &path,
            r#"{"executor": {"wave_timeout_secs": 60}, "unknown_key": 1}"#,
        )
        .unwrap();
        let config = Config::load(td.path()).unwrap();
        assert_eq!(config.executor.wave_timeout_secs, 60);
        assert_eq!(config.executor.poll_interval_ms, 1_000);
        assert_eq!(config.snapshots.retain, 20);
    }

    #[test]
    fn malformed_config_is_a_parse_error() {
        let td = tempfile::tempdir().unwrap();
        let path = swell_common::paths::config_path(td.path());
        swell_common::io::atomic_replace(&path, "{not json").unwrap();
        match Config::load(td.path()) {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn resolve_respects_absolute_paths() {
        let config = Config::default();
        let root = Path::new("/work/project");
        assert_eq!(
            config.task_list_path(root),
            PathBuf::from("/work/project/TASKS.md")
        );
        let absolute = Path::new("/elsewhere/rules.md");
        assert_eq!(config.resolve(root, absolute), absolute);
    }
}
