//! `swell orchestrate [PHASE_ID]`

use swell_domain::planner::build_plan;
use swell_domain::tasks::parse_task_list;

use crate::cli_error::CliResult;
use crate::runtime::Runtime;

pub(crate) fn run(rt: &Runtime, phase_id: Option<&str>) -> CliResult<()> {
    let contents = rt.read_task_list()?;
    let parsed = parse_task_list(&contents)?;

    println!(
        "Parsed {} task(s), {} complete, {} warning(s)",
        parsed.report.total,
        parsed.report.complete,
        parsed.report.warnings.len()
    );
    for warning in &parsed.report.warnings {
        match warning.line {
            Some(line) => println!("  warning (line {}): {}", line + 1, warning.message),
            None => println!("  warning: {}", warning.message),
        }
    }

    let phase = phase_id.unwrap_or("default");
    let created_at = chrono::Utc::now().to_rfc3339();
    let plan = build_plan(phase, &created_at, &parsed.tasks)?;

    let waves = &plan.execution_plan.waves;
    println!();
    for wave in waves {
        println!("{}", wave.rationale);
    }

    if rt.dry_run {
        println!("\n(dry run; plan not written)");
        return Ok(());
    }

    rt.plan_store().save(&plan)?;
    rt.activity().append(&format!(
        "orchestrated phase '{phase}': {} task(s) across {} wave(s)",
        parsed.report.total,
        waves.len()
    ))?;
    println!(
        "\nPlan written: {} wave(s) for phase '{phase}'",
        waves.len()
    );
    Ok(())
}
