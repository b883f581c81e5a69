//! The wave executor.
//!
//! A single-threaded driver: it loads the plan, walks the waves in order,
//! registers each task with the watchdog (as an observer; a failed
//! registration never aborts the wave), and then blocks on the task-list
//! handshake: external workers toggle checkboxes, the executor re-reads the
//! file on a polling interval and considers the wave handed off once every
//! task is checked and the list has been quiet for a stable period. The
//! checkpoint gate then decides whether the wave may complete.
//!
//! The executor never spawns parallel workers itself; the `PARALLEL`
//! strategy tag only changes whether registrations are issued all up front
//! or one at a time. The parallelism is in the external workers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use swell_common::fs::StdFs;
use swell_common::io;
use swell_common::lock::LockedFile;
use swell_common::paths;
use swell_config::Config;
use swell_domain::plan::{PlanDocument, Wave, WaveStrategy};
use swell_domain::tasks::parse_task_list;

use crate::activity::ActivityLog;
use crate::checkpoint::CheckpointGate;
use crate::context::{ContextMonitor, HookPayload, invoke_hook};
use crate::errors::{CoreError, CoreResult};
use crate::process::ProcessRunner;
use crate::rule_engine::RuleEngine;
use crate::watchdog::probe::ProcessProbe;
use crate::watchdog::{RegisterRequest, Watchdog};

/// The executor's persisted progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorState {
    /// Wave currently being driven, when one is.
    pub current_wave: Option<u32>,
    /// Waves whose checkpoint has returned success.
    pub completed_waves: Vec<u32>,
}

/// Load the executor state, defaulting to empty when absent.
pub fn load_state(root: &Path) -> CoreResult<ExecutorState> {
    let path = paths::executor_state_path(root);
    if !path.exists() {
        return Ok(ExecutorState::default());
    }
    let raw = io::read_to_string(&path)
        .map_err(|source| CoreError::io(format!("reading {}", path.display()), source))?;
    serde_json::from_str(&raw)
        .map_err(|e| CoreError::parse(format!("parsing {}: {e}", path.display())))
}

/// Persist the executor state atomically.
pub fn save_state(root: &Path, state: &ExecutorState) -> CoreResult<()> {
    let path = paths::executor_state_path(root);
    let rendered = serde_json::to_string_pretty(state)
        .map_err(|e| CoreError::parse(format!("serializing executor state: {e}")))?;
    io::atomic_replace(&path, rendered)
        .map_err(|source| CoreError::io(format!("writing {}", path.display()), source))
}

/// What an execute run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Waves driven to a successful checkpoint this run.
    pub waves_run: Vec<u32>,
    /// Waves skipped because they were already complete.
    pub waves_skipped: Vec<u32>,
}

/// The executor. One instance per invocation.
pub struct WaveExecutor<'a, P: ProcessProbe> {
    root: PathBuf,
    config: &'a Config,
    runner: &'a dyn ProcessRunner,
    watchdog: Watchdog<'a, P>,
}

impl<'a, P: ProcessProbe> WaveExecutor<'a, P> {
    /// Build an executor for the project at `root`.
    pub fn new(
        root: &Path,
        config: &'a Config,
        runner: &'a dyn ProcessRunner,
        probe: P,
    ) -> Self {
        let watchdog = Watchdog::new(
            root,
            config.watchdog.clone(),
            config.lock_timeout(),
            probe,
            runner,
        );
        Self {
            root: root.to_path_buf(),
            config,
            runner,
            watchdog,
        }
    }

    /// Drive every remaining wave of `plan`. `interrupt` is checked before
    /// each dispatch and during the handshake; when it flips the executor
    /// stops, preserves all progress files, and fails. In-flight workers
    /// continue; the watchdog still owns their supervision.
    pub fn run(
        &mut self,
        plan: &PlanDocument,
        interrupt: &AtomicBool,
    ) -> CoreResult<ExecutionSummary> {
        let rule_doc = self.config.rule_doc_path(&self.root);
        let mut engine = RuleEngine::load(&rule_doc)?;
        if engine.is_none() {
            if self.config.executor.enforcement_required {
                return Err(CoreError::ConstitutionMissing { path: rule_doc });
            }
            tracing::warn!(
                path = %rule_doc.display(),
                "rule document absent; checkpoint gate will skip rule validation"
            );
        }

        let activity = ActivityLog::new(&self.root, self.config.lock_timeout());
        let mut state = load_state(&self.root)?;
        let mut summary = ExecutionSummary::default();

        for wave in &plan.execution_plan.waves {
            if state.completed_waves.contains(&wave.wave_id) {
                summary.waves_skipped.push(wave.wave_id);
                continue;
            }
            if interrupt.load(Ordering::Relaxed) {
                return Err(CoreError::process(format!(
                    "interrupted before wave {}",
                    wave.wave_id
                )));
            }

            state.current_wave = Some(wave.wave_id);
            save_state(&self.root, &state)?;
            self.announce(wave);

            self.dispatch(wave, interrupt)?;
            self.await_handshake(wave, interrupt)?;

            let gate = CheckpointGate::new(&self.root, self.config, self.runner);
            gate.run(wave, engine.as_mut(), &activity)?;

            state.completed_waves.push(wave.wave_id);
            state.current_wave = None;
            save_state(&self.root, &state)?;
            summary.waves_run.push(wave.wave_id);

            self.consider_compaction(wave, &activity);
        }

        Ok(summary)
    }

    fn announce(&self, wave: &Wave) {
        println!(
            "\nWave {} ({}): {}",
            wave.wave_id,
            wave.strategy.as_str(),
            wave.rationale
        );
        for task in &wave.tasks {
            println!("  - {}: {}", task.task_id, task.instruction);
        }
    }

    /// Issue watchdog registrations. Under `PARALLEL` all registrations go
    /// out before the handshake; under `SEQUENTIAL` each task is registered
    /// and awaited before the next one is announced.
    fn dispatch(&mut self, wave: &Wave, interrupt: &AtomicBool) -> CoreResult<()> {
        match wave.strategy {
            WaveStrategy::Parallel => {
                for task in &wave.tasks {
                    self.register_task(wave, task);
                }
            }
            WaveStrategy::Sequential => {
                for task in &wave.tasks {
                    if interrupt.load(Ordering::Relaxed) {
                        return Err(CoreError::process(format!(
                            "interrupted during wave {}",
                            wave.wave_id
                        )));
                    }
                    self.register_task(wave, task);
                    self.await_tasks(wave, std::slice::from_ref(&task.task_id), interrupt)?;
                }
            }
        }
        Ok(())
    }

    fn register_task(&mut self, wave: &Wave, task: &swell_domain::plan::PlannedTask) {
        let request = RegisterRequest {
            task_id: task.task_id.clone(),
            command: task.instruction.clone(),
            rules: task.constitution_rules.clone(),
            env_tag: Some(format!("TASK_ID={}", task.task_id)),
            native: None,
            container: None,
        };
        // The watchdog is an observer, not a required runtime.
        if let Err(err) = self.watchdog.register(request) {
            tracing::warn!(
                task = %task.task_id,
                wave = wave.wave_id,
                error = %err,
                "watchdog registration failed; continuing"
            );
        }
    }

    fn await_handshake(&self, wave: &Wave, interrupt: &AtomicBool) -> CoreResult<()> {
        let ids: Vec<String> = wave.tasks.iter().map(|t| t.task_id.clone()).collect();
        self.await_tasks(wave, &ids, interrupt)
    }

    /// Poll the task list until every id in `ids` is checked off and the
    /// list has held stable for the quiet period.
    fn await_tasks(&self, wave: &Wave, ids: &[String], interrupt: &AtomicBool) -> CoreResult<()> {
        let deadline = Instant::now() + self.config.wave_timeout();
        let mut last_toggle = Instant::now();
        let mut last_completed: Option<usize> = None;

        loop {
            if interrupt.load(Ordering::Relaxed) {
                return Err(CoreError::process(format!(
                    "interrupted during wave {}",
                    wave.wave_id
                )));
            }

            let completed = self.read_completed();
            let pending: Vec<String> = ids
                .iter()
                .filter(|id| !completed.contains(*id))
                .cloned()
                .collect();

            let done_count = ids.len() - pending.len();
            if last_completed != Some(done_count) {
                last_completed = Some(done_count);
                last_toggle = Instant::now();
            }

            if pending.is_empty() && last_toggle.elapsed() >= self.config.quiet_period() {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(CoreError::WaveTimeout {
                    wave: wave.wave_id,
                    pending,
                });
            }

            std::thread::sleep(self.config.poll_interval());
        }
    }

    /// Read the set of checked-off ids; a transiently unreadable or
    /// malformed list counts as no progress for this poll.
    fn read_completed(&self) -> BTreeSet<String> {
        let task_list = self.config.task_list_path(&self.root);
        let lock_path = paths::task_list_lock_path(&self.root);
        let Ok(_lock) = LockedFile::shared(&lock_path, self.config.lock_timeout()) else {
            return BTreeSet::new();
        };
        let Ok(contents) = io::read_to_string(&task_list) else {
            return BTreeSet::new();
        };
        match parse_task_list(&contents) {
            Ok(parsed) => parsed.completed_ids(),
            Err(err) => {
                tracing::warn!(error = %err, "task list unparseable during handshake");
                BTreeSet::new()
            }
        }
    }

    fn consider_compaction(&self, wave: &Wave, activity: &ActivityLog) {
        let Some(hook) = &self.config.paths.pre_compaction_hook else {
            return;
        };
        let fs = StdFs;
        let sidecars: Vec<PathBuf> = self
            .config
            .paths
            .context_sidecars
            .iter()
            .map(|p| self.config.resolve(&self.root, p))
            .collect();
        let persona_state = self
            .config
            .paths
            .persona_state
            .as_ref()
            .map(|p| self.config.resolve(&self.root, p));
        let monitor = ContextMonitor::new(&fs, &self.config.context, sidecars, persona_state);
        let budget = monitor.assess();
        if !budget.should_compact(self.config.context.persona_trigger) {
            return;
        }

        let hook_path = self.config.resolve(&self.root, hook);
        let payload = HookPayload {
            wave: wave.wave_id,
            active_personas: budget.active_personas,
            reason: budget.zone.as_str(),
        };
        tracing::info!(
            zone = budget.zone.as_str(),
            personas = budget.active_personas,
            "requesting pre-compaction between waves"
        );
        if let Some(output) = invoke_hook(self.runner, &hook_path, &payload) {
            let note = format!(
                "pre-compaction hook after wave {} (zone {}, exit {})",
                wave.wave_id,
                budget.zone.as_str(),
                output.exit_code
            );
            let block = format!("{}\n{}", output.stdout.trim(), output.stderr.trim());
            let _ = activity.append_block(&note, block.trim());
        }
    }
}
