//! Domain-layer error types.
//!
//! [`DomainError`] is the canonical error type for `swell-domain`. Input
//! errors carry the offending location where one exists and a concrete
//! remediation hint; they are never auto-corrected. Adapter layers convert
//! these into their own presentation types.

use thiserror::Error;

/// Result alias for domain-layer operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Canonical error type for the domain layer.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The task list contains list-like lines but none shaped like a task.
    #[error("task list has no task-shaped lines: {hint}")]
    InvalidTaskListFormat {
        /// Remediation hint for the operator.
        hint: String,
    },

    /// A task names a predecessor that does not exist in the plan.
    #[error("task '{task_id}' depends on unknown task '{predecessor}'")]
    UnknownPredecessor {
        /// The referencing task.
        task_id: String,
        /// The missing predecessor id.
        predecessor: String,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency: {}", cycle.join(" -> "))]
    CircularDependency {
        /// The task ids forming the cycle, in order, first repeated last.
        cycle: Vec<String>,
    },

    /// A plan document violates a structural invariant.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl DomainError {
    /// A concrete remediation suggestion for the error, when one exists.
    pub fn remediation(&self) -> Option<String> {
        match self {
            DomainError::InvalidTaskListFormat { .. } => Some(
                "Task lines look like `- [ ] T001: description`; check the bullet and checkbox style."
                    .to_string(),
            ),
            DomainError::UnknownPredecessor { predecessor, .. } => Some(format!(
                "Add a task with id '{predecessor}' or remove the reference."
            )),
            DomainError::CircularDependency { .. } => {
                Some("Break the cycle by removing one of the listed dependencies.".to_string())
            }
            DomainError::InvalidPlan(_) => None,
        }
    }
}
