//! Core-layer error types.
//!
//! [`CoreError`] is the canonical error type for `swell-core`: a closed
//! taxonomy covering store, gate, scheduling, and concurrency failures.
//! All public functions in this crate return [`CoreResult<T>`]. The CLI
//! converts `CoreError` into its own presentation type; none of the
//! variants carry presentation logic.

use std::io;
use std::path::PathBuf;

use swell_common::lock::LockError;
use swell_domain::errors::DomainError;
use thiserror::Error;

use crate::rule_engine::Violation;

/// Result alias for core-layer operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Canonical error type for the core engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An error propagated from the domain layer.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The plan document (and its backup) failed to parse or validate.
    #[error("plan corrupted: {message}")]
    PlanCorrupted {
        /// Plan file path.
        path: PathBuf,
        /// Where the corrupt content was preserved, when it was.
        preserved: Option<PathBuf>,
        /// Failure detail.
        message: String,
    },

    /// A plan read kept observing in-flight writes after bounded retries.
    #[error("plan at {path} changed underneath the reader; retry the command")]
    ConcurrentPlanWrite {
        /// Plan file path.
        path: PathBuf,
    },

    /// The rule document is absent and enforcement is required.
    #[error("rule document not found at {path}")]
    ConstitutionMissing {
        /// Expected rule-document path.
        path: PathBuf,
    },

    /// Rule validation produced at least one error-severity violation.
    #[error("{} rule violation(s) block the checkpoint", violations.iter().filter(|v| v.blocking()).count())]
    ConstitutionViolation {
        /// Every violation found, warnings included for context.
        violations: Vec<Violation>,
    },

    /// A wave's tasks are not all checked off in the task list.
    #[error("wave {wave} incomplete: {} task(s) unfinished", unfinished.len())]
    IncompleteWave {
        /// Wave index.
        wave: u32,
        /// Ids still unchecked.
        unfinished: Vec<String>,
    },

    /// The handshake for a wave did not finish within the timeout.
    #[error("wave {wave} timed out waiting for {} task(s)", pending.len())]
    WaveTimeout {
        /// Wave index.
        wave: u32,
        /// Ids that never handed off.
        pending: Vec<String>,
    },

    /// The checkpoint commit failed; staging was rolled back.
    #[error("checkpoint commit failed: {message}")]
    CheckpointCommitFailed {
        /// Failure detail from the version-control tool.
        message: String,
    },

    /// The process registry failed to parse and could not be recovered.
    #[error("registry corrupted: {message}")]
    RegistryCorrupted {
        /// Registry file path.
        path: PathBuf,
        /// Failure detail.
        message: String,
    },

    /// A task id is already registered in `RUNNING` state.
    #[error("task '{task_id}' is already registered and running")]
    AlreadyRegistered {
        /// Task id.
        task_id: String,
    },

    /// No registry record exists for the task id.
    #[error("no registered task '{task_id}'")]
    NoSuchTask {
        /// Task id.
        task_id: String,
    },

    /// An advisory lock could not be acquired in time.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Filesystem or other I/O failure.
    #[error("{context}: {source}")]
    Io {
        /// Short description of the operation that failed.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Parse failure (JSON documents, timestamps).
    #[error("{0}")]
    Parse(String),

    /// Subprocess execution failure (git, container runtime, hook).
    #[error("{0}")]
    Process(String),
}

impl CoreError {
    /// Build an I/O error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Build a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Build a process error.
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    /// A concrete remediation suggestion, when one exists.
    pub fn remediation(&self) -> Option<String> {
        match self {
            CoreError::Domain(err) => err.remediation(),
            CoreError::PlanCorrupted { preserved, .. } => Some(match preserved {
                Some(p) => format!(
                    "The corrupt file was preserved at {}; re-run `swell orchestrate` to write a fresh plan.",
                    p.display()
                ),
                None => "Re-run `swell orchestrate` to write a fresh plan.".to_string(),
            }),
            CoreError::ConstitutionMissing { path } => Some(format!(
                "Create the rule document at {} or set executor.enforcement_required to false.",
                path.display()
            )),
            CoreError::IncompleteWave { unfinished, .. } => Some(format!(
                "Finish and check off: {}.",
                unfinished.join(", ")
            )),
            CoreError::WaveTimeout { pending, .. } => Some(format!(
                "Workers never handed off {}; inspect them via `swell watchdog report`.",
                pending.join(", ")
            )),
            CoreError::AlreadyRegistered { task_id } => Some(format!(
                "Run `swell task-complete {task_id}` or prune the record first."
            )),
            _ => None,
        }
    }
}
