//! `swell finalize` and `swell recall`.

use swell_core::checkpoint::load_last_validation;
use swell_core::executor;
use swell_core::git::GitAdapter;
use swell_core::process::SystemProcessRunner;
use swell_core::snapshot::{Snapshot, markdown_section_items};
use swell_domain::tasks::parse_task_list;

use crate::cli_error::{CliError, CliResult};
use crate::commands::checkpoint::checkpoint_current;
use crate::runtime::Runtime;

/// Bound on the commit hashes captured in a snapshot.
const COMMIT_HISTORY: usize = 5;

pub(crate) fn finalize(rt: &Runtime) -> CliResult<()> {
    let snapshot = capture(rt)?;

    if rt.dry_run {
        let rendered = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CliError::msg(format!("serializing snapshot: {e}")))?;
        println!("{rendered}");
        println!("(dry run; snapshot not written)");
        return Ok(());
    }

    let path = rt.snapshot_store().write(&snapshot).map_err(CliError::from)?;
    rt.activity()
        .append(&format!("session finalized; snapshot {}", path.display()))
        .map_err(CliError::from)?;
    println!("Snapshot written: {}", path.display());

    // Best-effort checkpoint of the current wave; a gate failure is
    // reported but does not fail the finalize.
    match checkpoint_current(rt, None) {
        Ok(Some(wave)) => println!("Wave {wave} checkpointed."),
        Ok(None) => {}
        Err(err) => {
            println!("Checkpoint not advanced: {}", err.message);
        }
    }
    Ok(())
}

pub(crate) fn recall(rt: &Runtime, json: bool) -> CliResult<()> {
    let snapshot = rt
        .snapshot_store()
        .load_latest()
        .map_err(CliError::from)?
        .ok_or_else(|| {
            CliError::msg("no snapshot found").with_remediation("Run `swell finalize` at the end of a session first.")
        })?;

    if json {
        let rendered = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CliError::msg(format!("serializing snapshot: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    println!("Session {} at {}", snapshot.session_id, snapshot.timestamp);
    println!("────────────────────────────────────────");
    if let Some(phase) = &snapshot.phase {
        println!("Phase: {phase}");
    }
    match snapshot.current_wave {
        Some(wave) => println!("Current wave: {wave}"),
        None => println!("Current wave: none"),
    }
    println!(
        "Tasks: {}/{} complete",
        snapshot.tasks_complete, snapshot.tasks_total
    );
    if !snapshot.running_tasks.is_empty() {
        println!("Running: {}", snapshot.running_tasks.join(", "));
    }
    if let Some(validation) = &snapshot.last_validation {
        println!(
            "Last validation: {} ({} error(s), {} warning(s))",
            if validation.passed { "passed" } else { "failed" },
            validation.errors,
            validation.warnings
        );
    }
    if !snapshot.next_steps.is_empty() {
        println!("\nNext steps:");
        for step in &snapshot.next_steps {
            println!("  - {step}");
        }
    }
    if !snapshot.blockers.is_empty() {
        println!("\nBlockers:");
        for blocker in &snapshot.blockers {
            println!("  - {blocker}");
        }
    }
    if !snapshot.modified_files.is_empty() {
        println!("\nModified files:");
        for file in &snapshot.modified_files {
            println!("  - {file}");
        }
    }
    Ok(())
}

/// Assemble a snapshot from every source the engine owns: executor state,
/// the task list, the watchdog, the version-control layer, and the gate's
/// last validation outcome. Absent sources yield empty fields, never
/// failures.
fn capture(rt: &Runtime) -> CliResult<Snapshot> {
    let state = executor::load_state(rt.root()).unwrap_or_default();
    let plan = rt.plan_store().load_optional().ok().flatten();

    let task_list = rt.read_task_list().unwrap_or_default();
    let (tasks_total, tasks_complete) = parse_task_list(&task_list)
        .map(|parsed| (parsed.report.total, parsed.report.complete))
        .unwrap_or((0, 0));

    let runner = SystemProcessRunner;
    let running_tasks = rt
        .watchdog(&runner)
        .rehydrate()
        .map(|entries| entries.into_iter().map(|e| e.task_id).collect())
        .unwrap_or_default();

    let git = GitAdapter::new(&runner, rt.root());
    let recent_commits = git
        .recent_commits(COMMIT_HISTORY)
        .map(|commits| commits.into_iter().map(|c| c.hash).collect())
        .unwrap_or_default();
    let modified_files = git.modified_files().unwrap_or_default();

    Ok(Snapshot {
        session_id: uuid::Uuid::new_v4().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        phase: plan.map(|p| p.execution_plan.phase_id),
        current_wave: state.current_wave,
        completed_waves: state.completed_waves,
        running_tasks,
        tasks_total,
        tasks_complete,
        next_steps: markdown_section_items(&task_list, "Next Steps"),
        blockers: markdown_section_items(&task_list, "Blockers"),
        recent_commits,
        modified_files,
        last_validation: load_last_validation(rt.root()),
    })
}
