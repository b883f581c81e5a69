//! `swell checkpoint [MSG]`
//!
//! Runs the checkpoint gate out of band for the current wave: the wave the
//! executor recorded as in progress, or the first wave not yet completed.

use swell_core::checkpoint::CheckpointGate;
use swell_core::errors::CoreError;
use swell_core::executor::{self, ExecutorState};
use swell_core::process::SystemProcessRunner;
use swell_core::rule_engine::RuleEngine;
use swell_domain::plan::Wave;

use crate::cli_error::{CliError, CliResult};
use crate::commands::execute::print_violations;
use crate::commands::waves::load_plan;
use crate::runtime::Runtime;

pub(crate) fn run(rt: &Runtime, message: Option<&str>) -> CliResult<()> {
    match checkpoint_current(rt, message) {
        Ok(Some(wave)) => {
            println!("Wave {wave} checkpointed.");
            Ok(())
        }
        Ok(None) => {
            println!("No wave pending; nothing to checkpoint.");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Run the gate for the current wave. Returns the wave id when one was
/// checkpointed, `None` when the plan has no pending wave. Shared with
/// `finalize`.
pub(crate) fn checkpoint_current(
    rt: &Runtime,
    message: Option<&str>,
) -> CliResult<Option<u32>> {
    let plan = load_plan(rt)?;
    let mut state = executor::load_state(rt.root())?;

    let Some(wave) = current_wave(&plan.execution_plan.waves, &state) else {
        return Ok(None);
    };

    let rule_doc = rt.config().rule_doc_path(rt.root());
    let mut engine = RuleEngine::load(&rule_doc).map_err(CliError::from)?;
    if engine.is_none() && rt.config().executor.enforcement_required {
        return Err(CoreError::ConstitutionMissing { path: rule_doc }.into());
    }

    if rt.dry_run {
        println!("(dry run) would checkpoint wave {}", wave.wave_id);
        return Ok(Some(wave.wave_id));
    }

    let runner = SystemProcessRunner;
    let gate = CheckpointGate::new(rt.root(), rt.config(), &runner);
    let activity = rt.activity();
    match gate.run(wave, engine.as_mut(), &activity) {
        Ok(outcome) => {
            if let Some(message) = message {
                activity.append(&format!("checkpoint note: {message}")).map_err(CliError::from)?;
            }
            if let Some(commit) = &outcome.commit {
                println!("Checkpoint commit: {commit}");
            }
            if !outcome.violations.is_empty() {
                println!("Warnings:");
                print_violations(&outcome.violations);
            }
            if !state.completed_waves.contains(&wave.wave_id) {
                state.completed_waves.push(wave.wave_id);
            }
            state.current_wave = None;
            executor::save_state(rt.root(), &state).map_err(CliError::from)?;
            Ok(Some(wave.wave_id))
        }
        Err(err) => Err(map_gate_error(err)),
    }
}

fn current_wave<'a>(waves: &'a [Wave], state: &ExecutorState) -> Option<&'a Wave> {
    if let Some(current) = state.current_wave
        && let Some(wave) = waves.iter().find(|w| w.wave_id == current)
    {
        return Some(wave);
    }
    waves
        .iter()
        .find(|w| !state.completed_waves.contains(&w.wave_id))
}

/// Exit codes per the command table: validation failures are 1, commit
/// failures 2.
fn map_gate_error(err: CoreError) -> CliError {
    match err {
        CoreError::ConstitutionViolation { ref violations } => {
            print_violations(violations);
            CliError::from(err).with_code(1)
        }
        CoreError::IncompleteWave { .. } => CliError::from(err).with_code(1),
        CoreError::CheckpointCommitFailed { .. } => CliError::from(err).with_code(2),
        other => other.into(),
    }
}
