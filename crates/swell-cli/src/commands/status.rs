//! `swell status`: a one-screen overview.

use std::path::PathBuf;

use swell_common::fs::StdFs;
use swell_core::context::ContextMonitor;
use swell_core::executor;
use swell_core::process::SystemProcessRunner;
use swell_domain::tasks::parse_task_list;

use crate::cli_error::CliResult;
use crate::runtime::Runtime;

pub(crate) fn run(rt: &Runtime, json: bool) -> CliResult<()> {
    let plan = rt.plan_store().load_optional().ok().flatten();
    let state = executor::load_state(rt.root()).unwrap_or_default();

    let task_counts = rt
        .read_task_list()
        .ok()
        .and_then(|contents| parse_task_list(&contents).ok())
        .map(|parsed| (parsed.report.complete, parsed.report.total));

    let runner = SystemProcessRunner;
    let process_counts = rt.watchdog(&runner).report().ok();

    let fs = StdFs;
    let sidecars: Vec<PathBuf> = rt
        .config()
        .paths
        .context_sidecars
        .iter()
        .map(|p| rt.config().resolve(rt.root(), p))
        .collect();
    let persona_state = rt
        .config()
        .paths
        .persona_state
        .as_ref()
        .map(|p| rt.config().resolve(rt.root(), p));
    let monitor = ContextMonitor::new(&fs, &rt.config().context, sidecars, persona_state);
    let budget = monitor.assess();

    if json {
        let payload = serde_json::json!({
            "plan": plan.as_ref().map(|p| serde_json::json!({
                "phase_id": p.execution_plan.phase_id,
                "waves": p.execution_plan.waves.len(),
            })),
            "current_wave": state.current_wave,
            "completed_waves": state.completed_waves,
            "tasks": task_counts.map(|(complete, total)| serde_json::json!({
                "complete": complete,
                "total": total,
            })),
            "processes": process_counts.as_ref().map(|c| serde_json::json!({
                "running": c.running,
                "completed": c.completed,
                "failed": c.failed,
                "unknown": c.unknown,
            })),
            "context": {
                "zone": budget.zone.as_str(),
                "estimated_tokens": budget.estimated_tokens,
                "active_personas": budget.active_personas,
            },
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        return Ok(());
    }

    println!("swell status");
    println!("────────────────────────────────────────");
    match &plan {
        Some(plan) => println!(
            "Plan: phase '{}', {} wave(s)",
            plan.execution_plan.phase_id,
            plan.execution_plan.waves.len()
        ),
        None => println!("Plan: none (run `swell orchestrate`)"),
    }
    match state.current_wave {
        Some(wave) => println!("Current wave: {wave}"),
        None => println!("Current wave: none"),
    }
    if state.completed_waves.is_empty() {
        println!("Completed waves: none");
    } else {
        let completed: Vec<String> =
            state.completed_waves.iter().map(|w| w.to_string()).collect();
        println!("Completed waves: {}", completed.join(", "));
    }
    match task_counts {
        Some((complete, total)) => println!("Tasks: {complete}/{total} complete"),
        None => println!("Tasks: task list unavailable"),
    }
    match &process_counts {
        Some(counts) => println!(
            "Processes: {} running, {} completed, {} failed, {} unknown",
            counts.running, counts.completed, counts.failed, counts.unknown
        ),
        None => println!("Processes: registry unavailable"),
    }
    println!(
        "Context: {} ({} of {} estimated tokens, {} persona(s))",
        budget.zone.as_str(),
        budget.estimated_tokens,
        budget.window_tokens,
        budget.active_personas
    );
    Ok(())
}
