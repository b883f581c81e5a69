//! The process supervisor.
//!
//! The watchdog owns authoritative knowledge of which task processes are
//! alive. Everything else in the engine is a client of its command surface
//! (register, update-pid, complete, kill, list, sweep, rehydrate, report,
//! prune); nothing writes the registry directly.
//!
//! The sweep verifies every `running` record against reality: native
//! processes by PID plus kernel start time (so a recycled PID is never
//! mistaken for the original), containers through the runtime's inspect
//! command. Records whose process vanished become orphans (`failed`);
//! completed records with a live process are zombies and get their group
//! killed.

pub mod probe;
pub mod registry;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use swell_common::lock::SingletonLock;
use swell_common::paths;
use swell_config::WatchdogConfig;

use crate::errors::{CoreError, CoreResult};
use crate::process::{ProcessRequest, ProcessRunner};

use probe::{ProbeError, ProcessProbe};
use registry::{
    ContainerProcess, ExecutionMode, NativeProcess, ProcessRecord, RecordStatus, Registry,
    RegistryStore, ResourceLimits,
};

/// Native target supplied at registration or via update-pid.
#[derive(Debug, Clone)]
pub struct NativeTarget {
    /// Process id.
    pub pid: u32,
    /// Process-group id; defaults to the pid when the caller does not know.
    pub pgid: Option<i32>,
    /// Kernel start time, when the caller already captured it.
    pub start_time: Option<String>,
}

/// Container target supplied at registration.
#[derive(Debug, Clone)]
pub struct ContainerTarget {
    /// Runtime container id.
    pub container_id: String,
    /// Display name.
    pub container_name: String,
    /// Optional resource limits.
    pub resource_limits: Option<ResourceLimits>,
}

/// A registration request.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    /// Task id; at most one record per id.
    pub task_id: String,
    /// Command line, stored verbatim for display.
    pub command: String,
    /// Rule tags attached for later validation.
    pub rules: Vec<String>,
    /// Optional environment tag.
    pub env_tag: Option<String>,
    /// Native process, when already spawned.
    pub native: Option<NativeTarget>,
    /// Container, when the worker runs containerized.
    pub container: Option<ContainerTarget>,
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records examined.
    pub swept: usize,
    /// Records verified alive.
    pub live: usize,
    /// Records that transitioned to `failed` this pass.
    pub orphans: Vec<String>,
    /// Completed records whose process was still alive and got killed.
    pub zombies: Vec<String>,
    /// Records moved to `unknown` on transient lookup failures.
    pub unknown: Vec<String>,
    /// `unknown` records verified alive again.
    pub recovered: Vec<String>,
    /// True when container checks were skipped (runtime unavailable).
    pub containers_skipped: bool,
}

/// One line of the rehydration view.
#[derive(Debug, Clone, PartialEq)]
pub struct RehydrateEntry {
    /// Task id.
    pub task_id: String,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Seconds since registration.
    pub age_secs: i64,
    /// What the task is doing (its command line).
    pub command: String,
    /// Latest resource snapshot, when available.
    pub resources: Option<registry::ResourceSnapshot>,
}

/// Counts by status for the report command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// `running` records.
    pub running: usize,
    /// `completed` records.
    pub completed: usize,
    /// `failed` records.
    pub failed: usize,
    /// `unknown` records.
    pub unknown: usize,
}

/// The supervisor. One instance per invocation; the sweep-loop mode
/// additionally holds the singleton lock.
pub struct Watchdog<'a, P: ProcessProbe> {
    root: PathBuf,
    config: WatchdogConfig,
    store: RegistryStore,
    probe: P,
    runner: &'a dyn ProcessRunner,
    runtime_warned: AtomicBool,
}

impl<'a, P: ProcessProbe> Watchdog<'a, P> {
    /// Build a watchdog for the project at `root`.
    pub fn new(
        root: &Path,
        config: WatchdogConfig,
        lock_timeout: Duration,
        probe: P,
        runner: &'a dyn ProcessRunner,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            store: RegistryStore::new(root, lock_timeout),
            config,
            probe,
            runner,
            runtime_warned: AtomicBool::new(false),
        }
    }

    /// The registry store (read-only consumers: status, snapshot).
    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Register a task. Fails with [`CoreError::AlreadyRegistered`] when a
    /// `running` record for the id exists; terminal records are replaced.
    pub fn register(&mut self, request: RegisterRequest) -> CoreResult<()> {
        let native = match request.native {
            Some(target) => Some(self.native_subrecord(target, request.env_tag.clone())),
            None => None,
        };
        let container = request.container.map(|target| ContainerProcess {
            container_id: target.container_id,
            container_name: target.container_name,
            resource_limits: target.resource_limits,
        });
        let mode = if container.is_some() {
            ExecutionMode::Container
        } else {
            ExecutionMode::Native
        };
        let record = ProcessRecord {
            mode,
            command: request.command,
            status: RecordStatus::Running,
            started_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
            constitution_rules: request.rules,
            native,
            container,
            resources: None,
        };

        let task_id = request.task_id;
        self.store.update(move |registry| {
            if let Some(existing) = registry.tasks.get(&task_id)
                && existing.status == RecordStatus::Running
            {
                return Err(CoreError::AlreadyRegistered { task_id });
            }
            tracing::info!(task = %task_id, "task registered");
            registry.tasks.insert(task_id, record);
            Ok(())
        })
    }

    /// Attach (or replace) the native process of an already registered
    /// task. Used when the worker spawns after registration.
    pub fn update_pid(&mut self, task_id: &str, target: NativeTarget) -> CoreResult<()> {
        let native = self.native_subrecord(target, None);
        self.store.update(|registry| {
            let Some(record) = registry.tasks.get_mut(task_id) else {
                return Err(CoreError::NoSuchTask {
                    task_id: task_id.to_string(),
                });
            };
            let env_tag = record.native.as_ref().and_then(|n| n.env_tag.clone());
            record.native = Some(NativeProcess { env_tag, ..native });
            record.mode = ExecutionMode::Native;
            Ok(())
        })
    }

    /// Mark a task's process complete.
    pub fn complete(&mut self, task_id: &str) -> CoreResult<()> {
        self.store.update(|registry| {
            let Some(record) = registry.tasks.get_mut(task_id) else {
                return Err(CoreError::NoSuchTask {
                    task_id: task_id.to_string(),
                });
            };
            record.status = RecordStatus::Completed;
            record.completed_at = Some(chrono::Utc::now().to_rfc3339());
            tracing::info!(task = %task_id, "task completed");
            Ok(())
        })
    }

    /// Kill a task's process group or stop its container, then mark the
    /// record `failed` (it did not complete).
    pub fn kill(&mut self, task_id: &str) -> CoreResult<()> {
        let registry = self.store.load()?;
        let Some(record) = registry.tasks.get(task_id) else {
            return Err(CoreError::NoSuchTask {
                task_id: task_id.to_string(),
            });
        };
        self.terminate(record);
        self.store.update(|registry| {
            if let Some(record) = registry.tasks.get_mut(task_id) {
                record.status = RecordStatus::Failed;
                record.completed_at = Some(chrono::Utc::now().to_rfc3339());
            }
            Ok(())
        })
    }

    /// The current registry contents.
    pub fn list(&self) -> CoreResult<Registry> {
        self.store.load()
    }

    /// Remove a record (any state), or every terminal record when `task_id`
    /// is `None`. Records are never removed by anything else.
    pub fn prune(&mut self, task_id: Option<&str>) -> CoreResult<usize> {
        self.store.update(|registry| match task_id {
            Some(id) => {
                if registry.tasks.remove(id).is_none() {
                    return Err(CoreError::NoSuchTask {
                        task_id: id.to_string(),
                    });
                }
                Ok(1)
            }
            None => {
                let before = registry.tasks.len();
                registry.tasks.retain(|_, r| {
                    !matches!(r.status, RecordStatus::Completed | RecordStatus::Failed)
                });
                Ok(before - registry.tasks.len())
            }
        })
    }

    /// Run one sweep pass and persist the updated registry.
    pub fn sweep(&mut self) -> CoreResult<SweepReport> {
        let mut registry = self.store.load()?;
        let mut report = SweepReport::default();
        let mut zombie_kills: Vec<ProcessRecord> = Vec::new();

        for (task_id, record) in registry.tasks.iter_mut() {
            report.swept += 1;
            match record.status {
                RecordStatus::Running | RecordStatus::Unknown => {
                    let was_unknown = record.status == RecordStatus::Unknown;
                    match self.verify(record) {
                        Verification::Alive => {
                            if was_unknown {
                                report.recovered.push(task_id.clone());
                                record.status = RecordStatus::Running;
                            }
                            report.live += 1;
                        }
                        Verification::Gone => {
                            tracing::warn!(task = %task_id, "running task's process is gone (orphan)");
                            record.status = RecordStatus::Failed;
                            record.resources = None;
                            report.orphans.push(task_id.clone());
                        }
                        Verification::Transient => {
                            record.status = RecordStatus::Unknown;
                            report.unknown.push(task_id.clone());
                        }
                        Verification::Skipped => {
                            report.containers_skipped = true;
                        }
                        Verification::Unverifiable => {
                            // Registered, no pid or container yet; nothing
                            // to conclude.
                        }
                    }
                }
                RecordStatus::Completed => {
                    if matches!(self.verify(record), Verification::Alive) {
                        tracing::warn!(task = %task_id, "completed task still has a live process (zombie)");
                        zombie_kills.push(record.clone());
                        report.zombies.push(task_id.clone());
                        record.resources = None;
                    }
                }
                RecordStatus::Failed => {}
            }
        }

        for record in &zombie_kills {
            self.terminate(record);
        }

        self.store.save(&registry)?;
        tracing::info!(
            swept = report.swept,
            live = report.live,
            orphans = report.orphans.len(),
            zombies = report.zombies.len(),
            "sweep complete"
        );
        Ok(report)
    }

    /// A terse, human-readable view of every `running` record. Intended for
    /// recovering the operator's mental model after a context loss.
    pub fn rehydrate(&self) -> CoreResult<Vec<RehydrateEntry>> {
        let registry = self.store.load()?;
        let now = chrono::Utc::now();
        Ok(registry
            .tasks
            .iter()
            .filter(|(_, r)| r.status == RecordStatus::Running)
            .map(|(task_id, record)| {
                let age_secs = chrono::DateTime::parse_from_rfc3339(&record.started_at)
                    .map(|t| (now - t.with_timezone(&chrono::Utc)).num_seconds())
                    .unwrap_or(0);
                RehydrateEntry {
                    task_id: task_id.clone(),
                    mode: record.mode,
                    age_secs,
                    command: record.command.clone(),
                    resources: record.resources.clone(),
                }
            })
            .collect())
    }

    /// Counts by status.
    pub fn report(&self) -> CoreResult<StatusReport> {
        let registry = self.store.load()?;
        let mut report = StatusReport::default();
        for record in registry.tasks.values() {
            match record.status {
                RecordStatus::Running => report.running += 1,
                RecordStatus::Completed => report.completed += 1,
                RecordStatus::Failed => report.failed += 1,
                RecordStatus::Unknown => report.unknown += 1,
            }
        }
        Ok(report)
    }

    /// Run the sweep loop until `stop` flips. Holds the singleton lock for
    /// the whole run; a second instance refuses to start.
    pub fn run_sweep_loop(&mut self, stop: &AtomicBool) -> CoreResult<()> {
        let lock_path = paths::watchdog_lock_path(&self.root);
        let _singleton = SingletonLock::acquire(&lock_path)?;
        tracing::info!(
            interval_secs = self.config.sweep_interval_secs,
            "watchdog sweep loop started"
        );
        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        loop {
            if let Err(err) = self.sweep() {
                tracing::warn!(error = %err, "sweep failed; will retry next interval");
            }
            let mut waited = Duration::ZERO;
            while waited < interval {
                if stop.load(Ordering::Relaxed) {
                    tracing::info!("watchdog sweep loop stopping");
                    return Ok(());
                }
                let step = Duration::from_millis(200).min(interval - waited);
                std::thread::sleep(step);
                waited += step;
            }
        }
    }

    fn native_subrecord(&mut self, target: NativeTarget, env_tag: Option<String>) -> NativeProcess {
        let start_time = match target.start_time {
            Some(st) => st,
            None => match self.probe.probe(target.pid) {
                Ok(Some(probed)) => probed.start_time,
                // An empty start time can never match a live process, so a
                // misregistered pid is classified as an orphan on the next
                // sweep instead of silently passing.
                Ok(None) | Err(_) => String::new(),
            },
        };
        NativeProcess {
            pid: target.pid,
            pgid: target.pgid.unwrap_or(target.pid as i32),
            start_time,
            env_tag,
        }
    }

    fn verify(&mut self, record: &mut ProcessRecord) -> Verification {
        match record.mode {
            ExecutionMode::Native => {
                let Some(native) = record.native.clone() else {
                    return Verification::Unverifiable;
                };
                match self.probe.probe(native.pid) {
                    Ok(Some(probed)) => {
                        if probed.start_time == native.start_time {
                            record.resources = probed.resources;
                            Verification::Alive
                        } else {
                            // PID recycled; the original process is gone.
                            Verification::Gone
                        }
                    }
                    Ok(None) => Verification::Gone,
                    Err(ProbeError(message)) => {
                        tracing::warn!(pid = native.pid, %message, "transient process lookup failure");
                        Verification::Transient
                    }
                }
            }
            ExecutionMode::Container => {
                let Some(container) = &record.container else {
                    return Verification::Unverifiable;
                };
                match self.container_running(&container.container_id) {
                    ContainerState::Running => Verification::Alive,
                    ContainerState::Stopped => Verification::Gone,
                    ContainerState::RuntimeUnavailable => {
                        if !self.runtime_warned.swap(true, Ordering::Relaxed) {
                            tracing::warn!(
                                runtime = %self.config.container_runtime,
                                "container runtime unavailable; skipping container sweeps"
                            );
                        }
                        Verification::Skipped
                    }
                }
            }
        }
    }

    fn container_running(&self, container_id: &str) -> ContainerState {
        let request = ProcessRequest::new(&self.config.container_runtime).args([
            "inspect",
            "-f",
            "{{.State.Running}}",
            container_id,
        ]);
        match self.runner.run(&request) {
            Ok(output) if output.success => {
                if output.stdout.trim() == "true" {
                    ContainerState::Running
                } else {
                    ContainerState::Stopped
                }
            }
            Ok(output) => {
                let detail = output.detail().to_ascii_lowercase();
                if detail.contains("no such") || detail.contains("not found") {
                    ContainerState::Stopped
                } else {
                    ContainerState::RuntimeUnavailable
                }
            }
            Err(_) => ContainerState::RuntimeUnavailable,
        }
    }

    fn terminate(&self, record: &ProcessRecord) {
        match record.mode {
            ExecutionMode::Native => {
                if let Some(native) = &record.native {
                    kill_process_group(native.pgid, Duration::from_secs(self.config.kill_grace_secs));
                }
            }
            ExecutionMode::Container => {
                if let Some(container) = &record.container {
                    let timeout = self.config.container_stop_secs.to_string();
                    let request = ProcessRequest::new(&self.config.container_runtime).args([
                        "stop",
                        container.container_id.as_str(),
                        "--time",
                        timeout.as_str(),
                    ]);
                    let bound = Duration::from_secs(self.config.container_stop_secs + 30);
                    if let Err(err) = self.runner.run_with_timeout(&request, bound) {
                        tracing::warn!(
                            container = %container.container_id,
                            error = %err,
                            "container stop failed"
                        );
                    }
                }
            }
        }
    }
}

enum Verification {
    Alive,
    Gone,
    Transient,
    Skipped,
    Unverifiable,
}

enum ContainerState {
    Running,
    Stopped,
    RuntimeUnavailable,
}

/// Signal the whole process group: graceful first, forceful after the
/// grace period if anything in the group survives.
#[cfg(unix)]
fn kill_process_group(pgid: i32, grace: Duration) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let group = Pid::from_raw(pgid);
    if killpg(group, Signal::SIGTERM).is_err() {
        return; // already gone
    }
    std::thread::sleep(grace);
    if killpg(group, None).is_ok() {
        let _ = killpg(group, Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(pgid: i32, _grace: Duration) {
    tracing::warn!(pgid, "process-group kill is not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::probe::test_support::{FakeProbe, ProbeScript};
    use super::*;
    use crate::process::test_support::StubRunner;
    use std::collections::BTreeMap;

    fn config() -> WatchdogConfig {
        WatchdogConfig {
            sweep_interval_secs: 1,
            kill_grace_secs: 0,
            container_runtime: "docker".to_string(),
            container_stop_secs: 1,
        }
    }

    fn probe(table: Vec<(u32, ProbeScript)>) -> FakeProbe {
        FakeProbe {
            table: BTreeMap::from_iter(table),
        }
    }

    fn native_request(task_id: &str, pid: u32, start_time: &str) -> RegisterRequest {
        RegisterRequest {
            task_id: task_id.to_string(),
            command: format!("worker --task {task_id}"),
            rules: vec!["NO_HARDCODED_SECRETS".to_string()],
            env_tag: Some(format!("TASK_ID={task_id}")),
            native: Some(NativeTarget {
                pid,
                pgid: Some(pid as i32),
                start_time: Some(start_time.to_string()),
            }),
            container: None,
        }
    }

    #[test]
    fn register_then_duplicate_running_registration_fails() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![(100, ProbeScript::Alive("111"))]),
            &runner,
        );
        dog.register(native_request("T001", 100, "111")).unwrap();
        let err = dog.register(native_request("T001", 100, "111")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyRegistered { .. }));
    }

    #[test]
    fn terminal_record_can_be_reregistered() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![]),
            &runner,
        );
        dog.register(native_request("T001", 100, "111")).unwrap();
        dog.complete("T001").unwrap();
        dog.register(native_request("T001", 200, "222")).unwrap();
        let registry = dog.list().unwrap();
        assert_eq!(registry.tasks["T001"].native.as_ref().unwrap().pid, 200);
    }

    #[test]
    fn complete_unknown_task_is_no_such_task() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![]),
            &runner,
        );
        assert!(matches!(
            dog.complete("T404").unwrap_err(),
            CoreError::NoSuchTask { .. }
        ));
    }

    #[test]
    fn sweep_keeps_live_records_and_snapshots_resources() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![(100, ProbeScript::Alive("111"))]),
            &runner,
        );
        dog.register(native_request("T001", 100, "111")).unwrap();
        let report = dog.sweep().unwrap();
        assert_eq!(report.live, 1);
        assert!(report.orphans.is_empty());
        let registry = dog.list().unwrap();
        assert_eq!(registry.tasks["T001"].status, RecordStatus::Running);
        assert!(registry.tasks["T001"].resources.is_some());
    }

    #[test]
    fn sweep_orphans_a_dead_process() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![(100, ProbeScript::Gone)]),
            &runner,
        );
        dog.register(native_request("T001", 100, "111")).unwrap();
        let report = dog.sweep().unwrap();
        assert_eq!(report.orphans, vec!["T001"]);
        let registry = dog.list().unwrap();
        assert_eq!(registry.tasks["T001"].status, RecordStatus::Failed);

        // No longer listed as running.
        let entries = dog.rehydrate().unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn sweep_orphans_a_recycled_pid() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            // Alive, but with a different start time than registered.
            probe(vec![(100, ProbeScript::Alive("999"))]),
            &runner,
        );
        dog.register(native_request("T001", 100, "111")).unwrap();
        let report = dog.sweep().unwrap();
        assert_eq!(report.orphans, vec!["T001"]);
        assert_eq!(
            dog.list().unwrap().tasks["T001"].status,
            RecordStatus::Failed
        );
    }

    #[test]
    fn transient_lookup_goes_unknown_then_recovers() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![(100, ProbeScript::Transient)]),
            &runner,
        );
        dog.register(native_request("T001", 100, "111")).unwrap();
        let report = dog.sweep().unwrap();
        assert_eq!(report.unknown, vec!["T001"]);
        assert_eq!(
            dog.list().unwrap().tasks["T001"].status,
            RecordStatus::Unknown
        );

        // Next sweep sees the process again: back to running.
        dog.probe.table.insert(100, ProbeScript::Alive("111"));
        let report = dog.sweep().unwrap();
        assert_eq!(report.recovered, vec!["T001"]);
        assert_eq!(
            dog.list().unwrap().tasks["T001"].status,
            RecordStatus::Running
        );
    }

    #[test]
    fn zombie_is_killed_but_stays_completed() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![(4_000_001, ProbeScript::Alive("111"))]),
            &runner,
        );
        // A pid nothing on the host uses, so the group kill is a no-op.
        dog.register(native_request("T001", 4_000_001, "111")).unwrap();
        dog.complete("T001").unwrap();
        let report = dog.sweep().unwrap();
        assert_eq!(report.zombies, vec!["T001"]);
        assert_eq!(
            dog.list().unwrap().tasks["T001"].status,
            RecordStatus::Completed
        );
    }

    #[test]
    fn container_sweep_uses_inspect_and_orphans_stopped() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![StubRunner::ok("false\n")]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![]),
            &runner,
        );
        dog.register(RegisterRequest {
            task_id: "T002".to_string(),
            command: "containerized worker".to_string(),
            rules: Vec::new(),
            env_tag: None,
            native: None,
            container: Some(ContainerTarget {
                container_id: "deadbeef".to_string(),
                container_name: "swell-T002".to_string(),
                resource_limits: Some(ResourceLimits {
                    memory: Some("512m".to_string()),
                    cpu: None,
                }),
            }),
        })
        .unwrap();

        let report = dog.sweep().unwrap();
        assert_eq!(report.orphans, vec!["T002"]);
        let requests = runner.requests.borrow();
        assert_eq!(requests[0].program, "docker");
        assert_eq!(requests[0].args[0], "inspect");
    }

    #[test]
    fn unavailable_runtime_skips_container_sweeps() {
        let td = tempfile::tempdir().unwrap();
        let runner =
            StubRunner::with_outputs(vec![StubRunner::err("cannot connect to the daemon")]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![]),
            &runner,
        );
        dog.register(RegisterRequest {
            task_id: "T002".to_string(),
            command: "containerized worker".to_string(),
            rules: Vec::new(),
            env_tag: None,
            native: None,
            container: Some(ContainerTarget {
                container_id: "deadbeef".to_string(),
                container_name: "swell-T002".to_string(),
                resource_limits: None,
            }),
        })
        .unwrap();

        let report = dog.sweep().unwrap();
        assert!(report.containers_skipped);
        assert_eq!(
            dog.list().unwrap().tasks["T002"].status,
            RecordStatus::Running
        );
    }

    #[test]
    fn record_without_pid_survives_sweep_until_update_pid() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![(500, ProbeScript::Alive("555"))]),
            &runner,
        );
        dog.register(RegisterRequest {
            task_id: "T003".to_string(),
            command: "pending worker".to_string(),
            rules: Vec::new(),
            env_tag: None,
            native: None,
            container: None,
        })
        .unwrap();

        let report = dog.sweep().unwrap();
        assert!(report.orphans.is_empty());
        assert_eq!(
            dog.list().unwrap().tasks["T003"].status,
            RecordStatus::Running
        );

        dog.update_pid(
            "T003",
            NativeTarget {
                pid: 500,
                pgid: None,
                start_time: None,
            },
        )
        .unwrap();
        let registry = dog.list().unwrap();
        let native = registry.tasks["T003"].native.as_ref().unwrap();
        assert_eq!(native.pid, 500);
        assert_eq!(native.start_time, "555");
        let report = dog.sweep().unwrap();
        assert_eq!(report.live, 1);
    }

    #[test]
    fn rehydrate_reports_running_records_with_age() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![(100, ProbeScript::Alive("111"))]),
            &runner,
        );
        dog.register(native_request("T001", 100, "111")).unwrap();
        dog.sweep().unwrap();
        let entries = dog.rehydrate().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task_id, "T001");
        assert!(entries[0].age_secs >= 0);
        assert!(entries[0].resources.is_some());
        assert_eq!(entries[0].command, "worker --task T001");
    }

    #[test]
    fn report_counts_by_status_and_prune_clears_terminal() {
        let td = tempfile::tempdir().unwrap();
        let runner = StubRunner::with_outputs(vec![]);
        let mut dog = Watchdog::new(
            td.path(),
            config(),
            Duration::from_secs(1),
            probe(vec![(1, ProbeScript::Alive("1")), (2, ProbeScript::Gone)]),
            &runner,
        );
        dog.register(native_request("T001", 1, "1")).unwrap();
        dog.register(native_request("T002", 2, "2")).unwrap();
        dog.register(native_request("T003", 3, "3")).unwrap();
        dog.complete("T003").unwrap();
        dog.sweep().unwrap();

        let report = dog.report().unwrap();
        assert_eq!(report.running, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);

        let pruned = dog.prune(None).unwrap();
        assert_eq!(pruned, 2);
        assert_eq!(dog.list().unwrap().tasks.len(), 1);

        assert!(matches!(
            dog.prune(Some("T404")).unwrap_err(),
            CoreError::NoSuchTask { .. }
        ));
    }
}
