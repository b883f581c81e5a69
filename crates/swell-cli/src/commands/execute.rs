//! `swell execute`

use swell_core::errors::CoreError;
use swell_core::executor::WaveExecutor;
use swell_core::process::SystemProcessRunner;
use swell_core::rule_engine::Violation;
use swell_core::watchdog::probe::SystemProbe;

use crate::cli_error::{CliError, CliResult};
use crate::commands::waves::load_plan;
use crate::runtime::Runtime;
use crate::signals;

pub(crate) fn run(rt: &Runtime) -> CliResult<()> {
    let plan = load_plan(rt)?;

    if rt.dry_run {
        let state = swell_core::executor::load_state(rt.root())?;
        for wave in &plan.execution_plan.waves {
            let status = if state.completed_waves.contains(&wave.wave_id) {
                "done"
            } else {
                "pending"
            };
            println!("Wave {} [{status}]: {}", wave.wave_id, wave.rationale);
        }
        println!("(dry run; nothing executed)");
        return Ok(());
    }

    let runner = SystemProcessRunner;
    let interrupt = signals::interrupt_flag();
    let mut executor = WaveExecutor::new(rt.root(), rt.config(), &runner, SystemProbe::new());

    match executor.run(&plan, interrupt) {
        Ok(summary) => {
            if summary.waves_run.is_empty() && !summary.waves_skipped.is_empty() {
                println!("All waves already complete; nothing to do.");
            } else {
                println!(
                    "\nExecution complete: {} wave(s) run, {} skipped",
                    summary.waves_run.len(),
                    summary.waves_skipped.len()
                );
            }
            Ok(())
        }
        Err(err) => Err(map_execute_error(err)),
    }
}

/// Exit codes per the command table: checkpoint failures are 2, the wave
/// timeout is 3, everything else 1.
fn map_execute_error(err: CoreError) -> CliError {
    match err {
        CoreError::WaveTimeout { .. } => CliError::from(err).with_code(3),
        CoreError::ConstitutionViolation { ref violations } => {
            print_violations(violations);
            CliError::from(err).with_code(2)
        }
        CoreError::IncompleteWave { .. } | CoreError::CheckpointCommitFailed { .. } => {
            CliError::from(err).with_code(2)
        }
        other => other.into(),
    }
}

/// Print every violation, warnings included for context.
pub(crate) fn print_violations(violations: &[Violation]) {
    for violation in violations {
        let location = match violation.line {
            Some(line) => format!("{}:{line}", violation.file),
            None => violation.file.clone(),
        };
        println!(
            "  [{}] {}: {} ({})",
            violation.severity.as_str(),
            violation.rule_id,
            violation.message,
            location
        );
    }
}
