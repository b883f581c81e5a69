//! Argument definitions for the `swell` binary.

use clap::{Parser, Subcommand};

/// A dependency-scheduled, wave-parallel execution engine for developer
/// task lists.
#[derive(Debug, Parser)]
#[command(name = "swell", version, about, max_term_width = 100)]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Show what would happen without writing anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest the task list and write the wave plan.
    Orchestrate {
        /// Phase identifier recorded in the plan.
        phase_id: Option<String>,
    },
    /// Run all remaining waves of the current plan.
    Execute,
    /// Print the plan summary.
    Waves {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run the checkpoint gate out of band for the current wave.
    Checkpoint {
        /// Extra note recorded in the activity log.
        message: Option<String>,
    },
    /// Process supervisor commands.
    Watchdog {
        #[command(subcommand)]
        action: WatchdogAction,
    },
    /// Register a task with the watchdog.
    #[command(name = "task-watchdog")]
    TaskWatchdog {
        #[command(subcommand)]
        action: TaskWatchdogAction,
    },
    /// Mark a task's process complete.
    #[command(name = "task-complete")]
    TaskComplete {
        /// Task id.
        task_id: String,
    },
    /// Rule document operations.
    Constitution {
        #[command(subcommand)]
        action: ConstitutionAction,
    },
    /// One-screen overview of plan, tasks, and processes.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Write a session snapshot and checkpoint progress.
    Finalize,
    /// Load and print the latest session snapshot.
    Recall {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration.
    Config,
}

/// `swell watchdog …`
#[derive(Debug, Subcommand)]
pub enum WatchdogAction {
    /// Run the sweep loop in the foreground (single instance).
    Start,
    /// Signal a running sweep loop to stop.
    Stop,
    /// Run one sweep pass now.
    Check,
    /// Kill a task's process group (or stop its container).
    Kill {
        /// Task id.
        task_id: String,
    },
    /// Print every registry record.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print counts by record status.
    Report {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Summarize every running task (for session recovery).
    Rehydrate,
    /// Remove one record, or all terminal records.
    Prune {
        /// Task id; omit to prune every completed/failed record.
        task_id: Option<String>,
    },
}

/// `swell task-watchdog …`
#[derive(Debug, Subcommand)]
pub enum TaskWatchdogAction {
    /// Register a task process.
    Register {
        /// Task id.
        task_id: String,
        /// Command line the worker runs (stored verbatim).
        #[arg(long)]
        command: String,
        /// Comma-separated rule tags.
        #[arg(long, value_delimiter = ',')]
        rules: Vec<String>,
        /// Native process id, when already spawned.
        #[arg(long)]
        pid: Option<u32>,
        /// Process-group id (defaults to the pid).
        #[arg(long)]
        pgid: Option<i32>,
        /// Container id, for containerized workers.
        #[arg(long)]
        container_id: Option<String>,
        /// Container display name.
        #[arg(long)]
        container_name: Option<String>,
        /// Container memory cap (runtime syntax).
        #[arg(long)]
        memory: Option<String>,
        /// Container CPU cap (runtime syntax).
        #[arg(long)]
        cpu: Option<String>,
    },
    /// Attach the spawned process to an existing registration.
    UpdatePid {
        /// Task id.
        task_id: String,
        /// Native process id.
        #[arg(long)]
        pid: u32,
        /// Process-group id (defaults to the pid).
        #[arg(long)]
        pgid: Option<i32>,
    },
}

/// `swell constitution …`
#[derive(Debug, Subcommand)]
pub enum ConstitutionAction {
    /// Score the rule document and print recommendations.
    Validate {
        /// Minimum acceptable quality score.
        #[arg(long, default_value_t = 60)]
        threshold: u8,
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the rule document.
    Show,
}
