//! `swell watchdog …`

use swell_common::lock::SingletonLock;
use swell_common::paths;
use swell_core::process::SystemProcessRunner;

use crate::cli::WatchdogAction;
use crate::cli_error::{CliError, CliResult};
use crate::runtime::Runtime;
use crate::signals;

pub(crate) fn run(rt: &Runtime, action: &WatchdogAction) -> CliResult<()> {
    let runner = SystemProcessRunner;
    match action {
        WatchdogAction::Start => start(rt, &runner),
        WatchdogAction::Stop => stop(rt),
        WatchdogAction::Check => check(rt, &runner),
        WatchdogAction::Kill { task_id } => kill(rt, &runner, task_id),
        WatchdogAction::List { json } => list(rt, &runner, *json),
        WatchdogAction::Report { json } => report(rt, &runner, *json),
        WatchdogAction::Rehydrate => rehydrate(rt, &runner),
        WatchdogAction::Prune { task_id } => prune(rt, &runner, task_id.as_deref()),
    }
}

fn start(rt: &Runtime, runner: &SystemProcessRunner) -> CliResult<()> {
    let mut dog = rt.watchdog(runner);
    println!(
        "Watchdog sweep loop starting (every {}s). Interrupt to stop.",
        rt.config().watchdog.sweep_interval_secs
    );
    let stop = signals::interrupt_flag();
    dog.run_sweep_loop(stop).map_err(|err| {
        CliError::msg(err.to_string())
            .with_remediation("If another watchdog is running, stop it first with `swell watchdog stop`.")
    })
}

fn stop(rt: &Runtime) -> CliResult<()> {
    let lock_path = paths::watchdog_lock_path(rt.root());
    let Some(pid) = SingletonLock::read_pid(&lock_path) else {
        println!("No watchdog instance recorded.");
        return Ok(());
    };
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => println!("Signaled watchdog (pid {pid}) to stop."),
            Err(nix::errno::Errno::ESRCH) => println!("Watchdog (pid {pid}) is not running."),
            Err(err) => {
                return Err(CliError::msg(format!("could not signal watchdog pid {pid}: {err}")));
            }
        }
    }
    #[cfg(not(unix))]
    {
        println!("Watchdog pid is {pid}; stop it with your platform's process tools.");
    }
    Ok(())
}

fn check(rt: &Runtime, runner: &SystemProcessRunner) -> CliResult<()> {
    let mut dog = rt.watchdog(runner);
    let report = dog.sweep().map_err(CliError::from)?;
    println!(
        "Swept {} record(s): {} live, {} orphaned, {} zombie(s) cleaned, {} unknown",
        report.swept,
        report.live,
        report.orphans.len(),
        report.zombies.len(),
        report.unknown.len()
    );
    for orphan in &report.orphans {
        println!("  orphan: {orphan}");
    }
    for zombie in &report.zombies {
        println!("  zombie: {zombie}");
    }
    if report.containers_skipped {
        println!("  note: container runtime unavailable; container records not verified");
    }
    Ok(())
}

fn kill(rt: &Runtime, runner: &SystemProcessRunner, task_id: &str) -> CliResult<()> {
    if rt.dry_run {
        println!("(dry run) would kill '{task_id}'");
        return Ok(());
    }
    let mut dog = rt.watchdog(runner);
    dog.kill(task_id).map_err(CliError::from)?;
    println!("Killed '{task_id}'.");
    Ok(())
}

fn list(rt: &Runtime, runner: &SystemProcessRunner, json: bool) -> CliResult<()> {
    let dog = rt.watchdog(runner);
    let registry = dog.list().map_err(CliError::from)?;
    if json {
        let rendered = serde_json::to_string_pretty(&registry)
            .map_err(|e| CliError::msg(format!("serializing registry: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }
    if registry.tasks.is_empty() {
        println!("Registry is empty.");
        return Ok(());
    }
    for (task_id, record) in &registry.tasks {
        println!(
            "  {} [{}] since {}: {}",
            task_id,
            record.status.as_str(),
            record.started_at,
            record.command
        );
    }
    Ok(())
}

fn report(rt: &Runtime, runner: &SystemProcessRunner, json: bool) -> CliResult<()> {
    let dog = rt.watchdog(runner);
    let counts = dog.report().map_err(CliError::from)?;
    if json {
        let payload = serde_json::json!({
            "running": counts.running,
            "completed": counts.completed,
            "failed": counts.failed,
            "unknown": counts.unknown,
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        return Ok(());
    }
    println!(
        "Processes: {} running, {} completed, {} failed, {} unknown",
        counts.running, counts.completed, counts.failed, counts.unknown
    );
    Ok(())
}

fn rehydrate(rt: &Runtime, runner: &SystemProcessRunner) -> CliResult<()> {
    let dog = rt.watchdog(runner);
    let entries = dog.rehydrate().map_err(CliError::from)?;
    if entries.is_empty() {
        println!("No running tasks.");
        return Ok(());
    }
    println!("Running tasks:");
    for entry in entries {
        let mode = match entry.mode {
            swell_core::watchdog::registry::ExecutionMode::Native => "native",
            swell_core::watchdog::registry::ExecutionMode::Container => "container",
        };
        let resources = entry
            .resources
            .map(|r| {
                format!(
                    ", cpu {:.1}%, mem {}MB",
                    r.cpu_percent,
                    r.memory_bytes / (1024 * 1024)
                )
            })
            .unwrap_or_default();
        println!(
            "  {} ({mode}, up {}){}: {}",
            entry.task_id,
            format_age(entry.age_secs),
            resources,
            entry.command
        );
    }
    Ok(())
}

fn prune(rt: &Runtime, runner: &SystemProcessRunner, task_id: Option<&str>) -> CliResult<()> {
    let mut dog = rt.watchdog(runner);
    let removed = dog.prune(task_id).map_err(CliError::from)?;
    println!("Pruned {removed} record(s).");
    Ok(())
}

fn format_age(secs: i64) -> String {
    if secs >= 3600 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
