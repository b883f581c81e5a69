//! Per-invocation runtime context.
//!
//! The CLI surface is stateless between invocations; a `Runtime` is built
//! fresh each run from the working directory and the on-disk
//! configuration, then passed into each command handler. No hidden
//! singletons.

use std::path::{Path, PathBuf};
use std::time::Duration;

use swell_config::Config;
use swell_core::activity::ActivityLog;
use swell_core::plan_store::PlanStore;
use swell_core::process::SystemProcessRunner;
use swell_core::snapshot::SnapshotStore;
use swell_core::watchdog::Watchdog;
use swell_core::watchdog::probe::SystemProbe;

use crate::cli_error::{CliError, CliResult};

/// Everything a command handler needs.
pub struct Runtime {
    root: PathBuf,
    config: Config,
    /// Global `--dry-run` flag.
    pub dry_run: bool,
}

impl Runtime {
    /// Build a runtime rooted at the current working directory.
    pub fn init(dry_run: bool) -> CliResult<Self> {
        let root = std::env::current_dir()
            .map_err(|e| CliError::msg(format!("cannot determine working directory: {e}")))?;
        let config = Config::load(&root).map_err(|e| CliError::msg(e.to_string()))?;
        Ok(Self {
            root,
            config,
            dry_run,
        })
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lock acquisition timeout.
    pub fn lock_timeout(&self) -> Duration {
        self.config.lock_timeout()
    }

    /// The plan store.
    pub fn plan_store(&self) -> PlanStore {
        PlanStore::new(&self.root, self.lock_timeout())
    }

    /// The snapshot store.
    pub fn snapshot_store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.root, self.config.snapshots.retain)
    }

    /// The activity log.
    pub fn activity(&self) -> ActivityLog {
        ActivityLog::new(&self.root, self.lock_timeout())
    }

    /// A watchdog over the real system probe.
    pub fn watchdog<'a>(
        &self,
        runner: &'a SystemProcessRunner,
    ) -> Watchdog<'a, SystemProbe> {
        Watchdog::new(
            &self.root,
            self.config.watchdog.clone(),
            self.lock_timeout(),
            SystemProbe::new(),
            runner,
        )
    }

    /// Read the task list, failing with a pointer at the configured path.
    pub fn read_task_list(&self) -> CliResult<String> {
        let path = self.config.task_list_path(&self.root);
        swell_common::io::read_to_string(&path).map_err(|_| {
            CliError::msg(format!("task list not found at {}", path.display()))
                .with_remediation("Create it or point paths.task_list somewhere else in .swell/config.json.")
        })
    }
}
