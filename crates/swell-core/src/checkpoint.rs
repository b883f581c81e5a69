//! The checkpoint gate.
//!
//! A wave may only be declared complete here. In order: re-parse the task
//! list and verify every task in the wave is checked off (under the
//! task-list lock), regenerate the progress artifact, validate the wave's
//! changed files against its rule tags, then create the checkpoint commit.
//! A failed commit rolls the staging area back and leaves the working tree
//! untouched; a successful commit is the point of no return for the wave.
//! The gate never force-pushes, never amends, never resets hard.

use std::path::{Path, PathBuf};

use swell_common::io;
use swell_common::lock::LockedFile;
use swell_common::paths;
use swell_config::Config;
use swell_domain::plan::Wave;
use swell_domain::tasks::parse_task_list;

use crate::activity::ActivityLog;
use crate::errors::{CoreError, CoreResult};
use crate::git::GitAdapter;
use crate::process::ProcessRunner;
use crate::rule_engine::{RuleEngine, Violation};

/// What the gate did for a wave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointOutcome {
    /// Hash of the checkpoint commit, when one was created.
    pub commit: Option<String>,
    /// Every violation found (warnings included); empty when validation
    /// was skipped.
    pub violations: Vec<Violation>,
    /// Files that were validated.
    pub validated_files: Vec<String>,
}

/// The gate itself, scoped to one project.
pub struct CheckpointGate<'a> {
    root: PathBuf,
    config: &'a Config,
    runner: &'a dyn ProcessRunner,
}

impl<'a> CheckpointGate<'a> {
    /// Build a gate for the project at `root`.
    pub fn new(root: &Path, config: &'a Config, runner: &'a dyn ProcessRunner) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            runner,
        }
    }

    /// Run the gate for `wave`. `engine` is `None` when the rule document
    /// is absent and enforcement is not required; validation is skipped in
    /// that case.
    pub fn run(
        &self,
        wave: &Wave,
        engine: Option<&mut RuleEngine>,
        activity: &ActivityLog,
    ) -> CoreResult<CheckpointOutcome> {
        let policy = &wave.checkpoint_after;
        if !policy.enabled {
            return Ok(CheckpointOutcome::default());
        }

        // Steps 1–2 hold the task-list lock: completion must be verified
        // against a stable document and the progress artifact must reflect
        // exactly what was verified.
        {
            let lock_path = paths::task_list_lock_path(&self.root);
            let _lock = LockedFile::exclusive(&lock_path, self.config.lock_timeout())?;

            if policy.verify_completion {
                self.verify_completion(wave)?;
            }
            if policy.update_progress {
                self.update_progress(wave)?;
            }
        }

        let mut outcome = CheckpointOutcome::default();
        if policy.validate_constitution
            && let Some(engine) = engine
        {
            let (violations, files) = self.validate_wave(wave, engine)?;
            outcome.validated_files = files;
            save_last_validation(&self.root, &violations);
            if violations.iter().any(Violation::blocking) {
                return Err(CoreError::ConstitutionViolation { violations });
            }
            outcome.violations = violations;
        }

        if policy.git_commit {
            outcome.commit = self.commit_checkpoint(wave)?;
        }

        let note = match &outcome.commit {
            Some(hash) => format!(
                "checkpoint: wave {} complete, commit {}, {} violation(s)",
                wave.wave_id,
                &hash[..hash.len().min(12)],
                outcome.violations.len()
            ),
            None => format!(
                "checkpoint: wave {} complete, no commit needed, {} violation(s)",
                wave.wave_id,
                outcome.violations.len()
            ),
        };
        activity.append(&note)?;

        Ok(outcome)
    }

    fn verify_completion(&self, wave: &Wave) -> CoreResult<()> {
        let task_list_path = self.config.task_list_path(&self.root);
        let contents = io::read_to_string(&task_list_path).map_err(|source| {
            CoreError::io(format!("reading {}", task_list_path.display()), source)
        })?;
        let parsed = parse_task_list(&contents)?;
        let completed = parsed.completed_ids();

        let unfinished: Vec<String> = wave
            .tasks
            .iter()
            .map(|t| t.task_id.clone())
            .filter(|id| !completed.contains(id))
            .collect();
        if !unfinished.is_empty() {
            return Err(CoreError::IncompleteWave {
                wave: wave.wave_id,
                unfinished,
            });
        }
        Ok(())
    }

    fn update_progress(&self, wave: &Wave) -> CoreResult<()> {
        let task_list_path = self.config.task_list_path(&self.root);
        let contents = io::read_to_string(&task_list_path).map_err(|source| {
            CoreError::io(format!("reading {}", task_list_path.display()), source)
        })?;
        let parsed = parse_task_list(&contents)?;

        let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC");
        let body = format!(
            "# Progress\n\nUpdated {stamp} by the checkpoint gate.\n\n- Wave {}: {} task(s) verified complete\n- Overall: {}/{} tasks complete\n",
            wave.wave_id,
            wave.tasks.len(),
            parsed.report.complete,
            parsed.report.total,
        );
        let progress_path = paths::progress_path(&self.root);
        io::atomic_replace(&progress_path, body).map_err(|source| {
            CoreError::io(format!("writing {}", progress_path.display()), source)
        })
    }

    fn validate_wave(
        &self,
        wave: &Wave,
        engine: &mut RuleEngine,
    ) -> CoreResult<(Vec<Violation>, Vec<String>)> {
        let git = GitAdapter::new(self.runner, &self.root);
        let changed = git.changed_since_head()?;

        // Only files this wave claims to write are the wave's to answer
        // for; deduplicate against the claim sets.
        let mut files: Vec<String> = Vec::new();
        for task in &wave.tasks {
            for lock in &task.file_locks {
                if changed.contains(lock) && !files.contains(lock) {
                    files.push(lock.clone());
                }
            }
        }

        let mut tags: Vec<String> = Vec::new();
        for task in &wave.tasks {
            for tag in &task.constitution_rules {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        let resolved = engine.resolve_tags(&tags);
        for unknown in &resolved.unknown {
            tracing::warn!(tag = %unknown, "unknown rule tag; skipped");
        }
        for tag in &resolved.unenforceable {
            tracing::warn!(%tag, "rule has no validator; skipped");
        }

        let violations = engine.validate(&self.root, &files, &resolved.known)?;
        Ok((violations, files))
    }

    fn commit_checkpoint(&self, wave: &Wave) -> CoreResult<Option<String>> {
        let git = GitAdapter::new(self.runner, &self.root);
        if git.status_short()?.is_empty() {
            tracing::info!(wave = wave.wave_id, "working tree clean; no checkpoint commit");
            return Ok(None);
        }
        git.stage_all()?;
        let message = format!(
            "[CHECKPOINT] Wave {} complete\n\nTasks: {}",
            wave.wave_id,
            wave.tasks
                .iter()
                .map(|t| t.task_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if let Err(detail) = git.commit(&message) {
            // Un-stage, leave the working tree untouched.
            if let Err(reset_err) = git.reset_index() {
                tracing::warn!(error = %reset_err, "reset after failed commit also failed");
            }
            return Err(CoreError::CheckpointCommitFailed { message: detail });
        }
        git.head_commit()
    }
}

/// Persist the latest validation outcome for snapshot capture. Best-effort:
/// a write failure here must not fail the gate.
fn save_last_validation(root: &Path, violations: &[Violation]) {
    let outcome = crate::snapshot::ValidationOutcome {
        passed: !violations.iter().any(Violation::blocking),
        errors: violations.iter().filter(|v| v.blocking()).count(),
        warnings: violations.iter().filter(|v| !v.blocking()).count(),
    };
    let path = paths::last_validation_path(root);
    if let Ok(rendered) = serde_json::to_string_pretty(&outcome)
        && let Err(err) = io::atomic_replace(&path, rendered)
    {
        tracing::warn!(path = %path.display(), error = %err, "could not record validation outcome");
    }
}

/// Load the gate's most recent validation outcome, when one was recorded.
pub fn load_last_validation(root: &Path) -> Option<crate::snapshot::ValidationOutcome> {
    let raw = io::read_to_string(&paths::last_validation_path(root)).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::test_support::StubRunner;
    use swell_domain::plan::{CheckpointPolicy, PlannedTask, WaveStrategy};

    fn wave(tasks: Vec<PlannedTask>) -> Wave {
        Wave {
            wave_id: 1,
            strategy: WaveStrategy::Sequential,
            rationale: "Wave 1".to_string(),
            tasks,
            checkpoint_after: CheckpointPolicy::default(),
        }
    }

    fn task(id: &str, files: &[&str], rules: &[&str]) -> PlannedTask {
        PlannedTask {
            task_id: id.to_string(),
            agent_role: "Developer".to_string(),
            instruction: format!("do {id}"),
            file_locks: files.iter().map(|s| s.to_string()).collect(),
            constitution_rules: rules.iter().map(|s| s.to_string()).collect(),
            dependencies: Vec::new(),
        }
    }

    fn write_task_list(root: &Path, contents: &str) {
        std::fs::write(root.join("TASKS.md"), contents).unwrap();
    }

    fn activity(root: &Path) -> ActivityLog {
        ActivityLog::new(root, std::time::Duration::from_secs(1))
    }

    #[test]
    fn incomplete_wave_blocks_with_unfinished_ids() {
        let td = tempfile::tempdir().unwrap();
        write_task_list(td.path(), "- [x] T1: done\n- [ ] T2: not done\n");
        let config = Config::default();
        let runner = StubRunner::with_outputs(vec![]);
        let gate = CheckpointGate::new(td.path(), &config, &runner);
        let w = wave(vec![task("T1", &[], &[]), task("T2", &[], &[])]);

        let err = gate.run(&w, None, &activity(td.path())).unwrap_err();
        match err {
            CoreError::IncompleteWave { wave, unfinished } => {
                assert_eq!(wave, 1);
                assert_eq!(unfinished, vec!["T2"]);
            }
            other => panic!("expected incomplete wave, got {other:?}"),
        }
    }

    #[test]
    fn blocking_violation_prevents_the_commit() {
        let td = tempfile::tempdir().unwrap();
        write_task_list(td.path(), "- [x] T1: write `leaky.py`\n");
        std::fs::write(td.path().join("leaky.py"), "password = \"hunter22\"\n").unwrap();
        let config = Config::default();
        // git diff --name-only HEAD, then git status --short
        let runner = StubRunner::with_outputs(vec![
            StubRunner::ok("leaky.py\n"),
            StubRunner::ok(" M leaky.py\n"),
        ]);
        let gate = CheckpointGate::new(td.path(), &config, &runner);
        let mut engine = RuleEngine::from_contents(
            "## Security\n\n- NO_HARDCODED_SECRETS: No credentials in source.\n",
        );
        let w = wave(vec![task("T1", &["leaky.py"], &["NO_HARDCODED_SECRETS"])]);

        let err = gate
            .run(&w, Some(&mut engine), &activity(td.path()))
            .unwrap_err();
        match err {
            CoreError::ConstitutionViolation { violations } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].file, "leaky.py");
                assert_eq!(violations[0].line, Some(1));
            }
            other => panic!("expected violation, got {other:?}"),
        }
        // Only the diff + status calls ran; stage and commit never did.
        assert_eq!(runner.requests.borrow().len(), 2);
    }

    #[test]
    fn successful_gate_commits_and_reports_the_hash() {
        let td = tempfile::tempdir().unwrap();
        write_task_list(td.path(), "- [x] T1: write `clean.py`\n");
        std::fs::write(td.path().join("clean.py"), "x = 1\n").unwrap();
        let config = Config::default();
        let runner = StubRunner::with_outputs(vec![
            StubRunner::ok("clean.py\n"),       // diff --name-only HEAD
            StubRunner::ok(" M clean.py\n"),    // status (changed_since_head)
            StubRunner::ok(" M clean.py\n"),    // status (pre-commit check)
            StubRunner::ok(""),                 // add -A
            StubRunner::ok(""),                 // commit
            StubRunner::ok("abc123 [CHECKPOINT] Wave 1 complete\n"), // log
        ]);
        let gate = CheckpointGate::new(td.path(), &config, &runner);
        let mut engine = RuleEngine::from_contents(
            "## Security\n\n- NO_HARDCODED_SECRETS: No credentials in source.\n",
        );
        let w = wave(vec![task("T1", &["clean.py"], &["NO_HARDCODED_SECRETS"])]);

        let outcome = gate.run(&w, Some(&mut engine), &activity(td.path())).unwrap();
        assert_eq!(outcome.commit.as_deref(), Some("abc123"));
        assert_eq!(outcome.validated_files, vec!["clean.py"]);
        assert!(outcome.violations.is_empty());

        // Progress artifact regenerated.
        let progress = std::fs::read_to_string(paths::progress_path(td.path())).unwrap();
        assert!(progress.contains("Wave 1"));
        // Activity entry appended.
        let log = std::fs::read_to_string(paths::activity_log_path(td.path())).unwrap();
        assert!(log.contains("checkpoint: wave 1 complete"));
    }

    #[test]
    fn failed_commit_rolls_back_staging() {
        let td = tempfile::tempdir().unwrap();
        write_task_list(td.path(), "- [x] T1: touch `a.py`\n");
        let config = Config::default();
        let runner = StubRunner::with_outputs(vec![
            StubRunner::ok(" M a.py\n"),            // status (pre-commit check)
            StubRunner::ok(""),                     // add -A
            StubRunner::err("pre-commit hook declined"), // commit fails
            StubRunner::ok(""),                     // reset
        ]);
        let gate = CheckpointGate::new(td.path(), &config, &runner);
        let mut w = wave(vec![task("T1", &[], &[])]);
        w.checkpoint_after.validate_constitution = false;

        let err = gate.run(&w, None, &activity(td.path())).unwrap_err();
        match err {
            CoreError::CheckpointCommitFailed { message } => {
                assert!(message.contains("hook declined"));
            }
            other => panic!("expected commit failure, got {other:?}"),
        }
        let requests = runner.requests.borrow();
        assert_eq!(requests.last().unwrap().args[0], "reset");
        assert_eq!(requests.last().unwrap().args.len(), 1);
    }

    #[test]
    fn clean_tree_checkpoints_without_a_commit() {
        let td = tempfile::tempdir().unwrap();
        write_task_list(td.path(), "- [x] T1: plan only\n");
        let config = Config::default();
        let runner = StubRunner::with_outputs(vec![StubRunner::ok("")]); // empty status
        let gate = CheckpointGate::new(td.path(), &config, &runner);
        let mut w = wave(vec![task("T1", &[], &[])]);
        w.checkpoint_after.validate_constitution = false;

        let outcome = gate.run(&w, None, &activity(td.path())).unwrap();
        assert!(outcome.commit.is_none());
    }

    #[test]
    fn disabled_policy_skips_everything() {
        let td = tempfile::tempdir().unwrap();
        let config = Config::default();
        let runner = StubRunner::with_outputs(vec![]);
        let gate = CheckpointGate::new(td.path(), &config, &runner);
        let mut w = wave(vec![task("T1", &[], &[])]);
        w.checkpoint_after.enabled = false;

        let outcome = gate.run(&w, None, &activity(td.path())).unwrap();
        assert_eq!(outcome, CheckpointOutcome::default());
    }
}
