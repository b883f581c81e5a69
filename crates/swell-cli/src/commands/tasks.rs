//! `swell task-watchdog …` and `swell task-complete`

use swell_core::errors::CoreError;
use swell_core::process::SystemProcessRunner;
use swell_core::watchdog::registry::ResourceLimits;
use swell_core::watchdog::{ContainerTarget, NativeTarget, RegisterRequest};

use crate::cli::TaskWatchdogAction;
use crate::cli_error::{CliError, CliResult};
use crate::runtime::Runtime;

pub(crate) fn run_task_watchdog(rt: &Runtime, action: &TaskWatchdogAction) -> CliResult<()> {
    let runner = SystemProcessRunner;
    match action {
        TaskWatchdogAction::Register {
            task_id,
            command,
            rules,
            pid,
            pgid,
            container_id,
            container_name,
            memory,
            cpu,
        } => {
            let native = pid.map(|pid| NativeTarget {
                pid,
                pgid: *pgid,
                start_time: None,
            });
            let container = match (container_id, container_name) {
                (Some(id), Some(name)) => Some(ContainerTarget {
                    container_id: id.clone(),
                    container_name: name.clone(),
                    resource_limits: if memory.is_some() || cpu.is_some() {
                        Some(ResourceLimits {
                            memory: memory.clone(),
                            cpu: cpu.clone(),
                        })
                    } else {
                        None
                    },
                }),
                (None, None) => None,
                _ => {
                    return Err(CliError::msg(
                        "--container-id and --container-name must be given together",
                    ));
                }
            };
            if native.is_some() && container.is_some() {
                return Err(CliError::msg("a task is native or containerized, not both"));
            }

            if rt.dry_run {
                println!("(dry run) would register '{task_id}'");
                return Ok(());
            }

            let mut dog = rt.watchdog(&runner);
            let request = RegisterRequest {
                task_id: task_id.clone(),
                command: command.clone(),
                rules: rules.clone(),
                env_tag: Some(format!("TASK_ID={task_id}")),
                native,
                container,
            };
            match dog.register(request) {
                Ok(()) => {
                    println!("Registered '{task_id}'.");
                    Ok(())
                }
                Err(err @ CoreError::AlreadyRegistered { .. }) => {
                    Err(CliError::from(err).with_code(1))
                }
                Err(err) => Err(err.into()),
            }
        }
        TaskWatchdogAction::UpdatePid { task_id, pid, pgid } => {
            let mut dog = rt.watchdog(&runner);
            dog.update_pid(
                task_id,
                NativeTarget {
                    pid: *pid,
                    pgid: *pgid,
                    start_time: None,
                },
            )
            .map_err(CliError::from)?;
            println!("Attached pid {pid} to '{task_id}'.");
            Ok(())
        }
    }
}

pub(crate) fn run_task_complete(rt: &Runtime, task_id: &str) -> CliResult<()> {
    if rt.dry_run {
        println!("(dry run) would complete '{task_id}'");
        return Ok(());
    }
    let runner = SystemProcessRunner;
    let mut dog = rt.watchdog(&runner);
    match dog.complete(task_id) {
        Ok(()) => {
            println!("Marked '{task_id}' complete.");
            Ok(())
        }
        Err(err @ CoreError::NoSuchTask { .. }) => Err(CliError::from(err).with_code(1)),
        Err(err) => Err(err.into()),
    }
}
