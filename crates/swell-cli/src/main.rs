//! The `swell` binary.

mod cli;
mod cli_error;
mod commands;
mod runtime;
mod signals;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::cli_error::CliResult;
use crate::runtime::Runtime;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let rt = match Runtime::init(cli.dry_run) {
        Ok(rt) => rt,
        Err(err) => {
            err.report();
            std::process::exit(err.code);
        }
    };

    if let Err(err) = dispatch(&rt, &cli.command) {
        err.report();
        std::process::exit(err.code);
    }
}

fn dispatch(rt: &Runtime, command: &Command) -> CliResult<()> {
    match command {
        Command::Orchestrate { phase_id } => commands::orchestrate::run(rt, phase_id.as_deref()),
        Command::Execute => commands::execute::run(rt),
        Command::Waves { json } => commands::waves::run(rt, *json),
        Command::Checkpoint { message } => commands::checkpoint::run(rt, message.as_deref()),
        Command::Watchdog { action } => commands::watchdog::run(rt, action),
        Command::TaskWatchdog { action } => commands::tasks::run_task_watchdog(rt, action),
        Command::TaskComplete { task_id } => commands::tasks::run_task_complete(rt, task_id),
        Command::Constitution { action } => match action {
            cli::ConstitutionAction::Validate { threshold, json } => {
                commands::constitution::validate(rt, *threshold, *json)
            }
            cli::ConstitutionAction::Show => commands::constitution::show(rt),
        },
        Command::Status { json } => commands::status::run(rt, *json),
        Command::Finalize => commands::session::finalize(rt),
        Command::Recall { json } => commands::session::recall(rt, *json),
        Command::Config => commands::config::run(rt),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let ansi = std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .init();
}
