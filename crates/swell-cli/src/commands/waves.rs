//! `swell waves`

use swell_domain::plan::PlanDocument;

use crate::cli_error::{CliError, CliResult};
use crate::runtime::Runtime;

pub(crate) fn run(rt: &Runtime, json: bool) -> CliResult<()> {
    let plan = load_plan(rt)?;

    if json {
        let rendered = serde_json::to_string_pretty(&plan)
            .map_err(|e| CliError::msg(format!("serializing plan: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    let inner = &plan.execution_plan;
    println!("Phase: {}", inner.phase_id);
    println!("Created: {}", inner.created_at);
    println!();
    for wave in &inner.waves {
        println!("Wave {} [{}]: {}", wave.wave_id, wave.strategy.as_str(), wave.rationale);
        for task in &wave.tasks {
            let files = if task.file_locks.is_empty() {
                String::new()
            } else {
                format!("  ({})", task.file_locks.join(", "))
            };
            println!("  - {}: {}{files}", task.task_id, task.instruction);
        }
    }
    Ok(())
}

/// Load the plan, mapping absence to exit code 1 with a pointer at
/// `orchestrate`.
pub(crate) fn load_plan(rt: &Runtime) -> CliResult<PlanDocument> {
    match rt.plan_store().load_optional() {
        Ok(Some(plan)) => Ok(plan),
        Ok(None) => Err(CliError::msg("no plan found")
            .with_remediation("Run `swell orchestrate` to create one.")),
        Err(err) => Err(err.into()),
    }
}
