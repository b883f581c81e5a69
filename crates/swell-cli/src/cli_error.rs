//! CLI-facing error shape and exit-code mapping.
//!
//! Core errors stay typed until this boundary; here they gain an exit code
//! and a rendering: a single-line summary followed by an indented
//! remediation block when one exists.

use swell_core::errors::CoreError;
use swell_domain::errors::DomainError;

/// Result alias for command handlers.
pub type CliResult<T> = Result<T, CliError>;

/// A presentable command failure.
#[derive(Debug)]
pub struct CliError {
    /// One-line summary.
    pub message: String,
    /// Optional indented remediation block.
    pub remediation: Option<String>,
    /// Process exit code.
    pub code: i32,
}

impl CliError {
    /// A plain failure with exit code 1.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            remediation: None,
            code: 1,
        }
    }

    /// Set the exit code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    /// Set the remediation block.
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    /// Render to stderr.
    pub fn report(&self) {
        eprintln!("error: {}", self.message);
        if let Some(remediation) = &self.remediation {
            for line in remediation.lines() {
                eprintln!("    {line}");
            }
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let remediation = err.remediation();
        let code = default_exit_code(&err);
        let mut cli = CliError::msg(err.to_string()).with_code(code);
        if let Some(remediation) = remediation {
            cli = cli.with_remediation(remediation);
        }
        cli
    }
}

impl From<DomainError> for CliError {
    fn from(err: DomainError) -> Self {
        CliError::from(CoreError::Domain(err))
    }
}

/// Exit code for a core error before a command applies its own table.
/// Cycle detection is 2 everywhere it can surface; everything else
/// defaults to 1 and individual commands override (timeouts, gate
/// failures).
fn default_exit_code(err: &CoreError) -> i32 {
    match err {
        CoreError::Domain(DomainError::CircularDependency { .. }) => 2,
        _ => 1,
    }
}
