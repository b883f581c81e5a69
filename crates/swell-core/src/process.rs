//! Process execution boundary for core-side command invocation.
//!
//! Every subprocess the engine runs (git, the container runtime, the
//! pre-compaction hook) goes through [`ProcessRunner`] so tests can inject
//! scripted outputs. Exit code and stderr are converted into typed errors
//! at each adapter, never silently swallowed.

use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

static OUTPUT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process invocation request.
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    /// Executable name or absolute path.
    pub program: String,
    /// Positional arguments.
    pub args: Vec<String>,
    /// Optional working directory.
    pub current_dir: Option<PathBuf>,
    /// Optional data written to the child's stdin.
    pub stdin: Option<String>,
}

impl ProcessRequest {
    /// Create a new request for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Add multiple arguments, in order, after any already present.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self.args.push(arg.into());
        }
        self
    }

    /// Set the working directory for the process.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Provide data for the child's stdin.
    pub fn stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }
}

/// Structured process execution output.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit status code, or -1 if unavailable.
    pub exit_code: i32,
    /// Whether the process exited successfully.
    pub success: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// True if execution was forcibly terminated due to timeout.
    pub timed_out: bool,
}

impl ProcessOutput {
    /// stderr when non-empty, else stdout, else a placeholder. Used when
    /// rendering subprocess failures into error messages.
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "no command output".to_string()
    }
}

/// Process execution failure modes.
#[derive(Debug, thiserror::Error)]
pub enum ProcessExecutionError {
    /// Spawn failed before a child process was created.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program being executed.
        program: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Waiting for process completion failed.
    #[error("failed waiting for '{program}': {source}")]
    Wait {
        /// Program being executed.
        program: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Capturing output through a temp file failed.
    #[error("failed to capture output for '{program}' at '{path}': {source}")]
    Capture {
        /// Program being executed.
        program: String,
        /// Temp path used for output capture.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Abstraction for process execution.
pub trait ProcessRunner {
    /// Execute a process and wait for completion, capturing all output.
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, ProcessExecutionError>;

    /// Execute with a timeout; on expiry the child is killed and
    /// `timed_out` is set. Output captured before the kill is returned.
    fn run_with_timeout(
        &self,
        request: &ProcessRequest,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessExecutionError>;
}

/// Default runner backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, ProcessExecutionError> {
        let mut command = build_command(request);
        if request.stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| ProcessExecutionError::Spawn {
            program: request.program.clone(),
            source,
        })?;
        if let Some(data) = &request.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            // The child may exit without draining stdin; a broken pipe here
            // is not an execution failure.
            let _ = stdin.write_all(data.as_bytes());
        }
        let output = child
            .wait_with_output()
            .map_err(|source| ProcessExecutionError::Wait {
                program: request.program.clone(),
                source,
            })?;
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out: false,
        })
    }

    fn run_with_timeout(
        &self,
        request: &ProcessRequest,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessExecutionError> {
        // Output goes to temp files so a full pipe can never wedge the
        // child while we poll for the deadline.
        let stdout_path = temp_output_path("stdout");
        let stderr_path = temp_output_path("stderr");
        let stdout_file = create_capture_file(&request.program, &stdout_path)?;
        let stderr_file = create_capture_file(&request.program, &stderr_path)?;

        let mut command = build_command(request);
        if request.stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }
        let mut child = command
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(|source| ProcessExecutionError::Spawn {
                program: request.program.clone(),
                source,
            })?;
        if let Some(data) = &request.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            let _ = stdin.write_all(data.as_bytes());
        }

        let started = Instant::now();
        let mut timed_out = false;
        let mut exit_code = -1;
        let mut success = false;
        loop {
            if let Some(status) =
                child
                    .try_wait()
                    .map_err(|source| ProcessExecutionError::Wait {
                        program: request.program.clone(),
                        source,
                    })?
            {
                exit_code = status.code().unwrap_or(-1);
                success = status.success();
                break;
            }
            if started.elapsed() >= timeout {
                timed_out = true;
                let _ = child.kill();
                let _ = child.wait();
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        let stdout = read_capture_file(&request.program, &stdout_path)?;
        let stderr = read_capture_file(&request.program, &stderr_path)?;
        let _ = fs::remove_file(&stdout_path);
        let _ = fs::remove_file(&stderr_path);

        Ok(ProcessOutput {
            exit_code,
            success: !timed_out && success,
            stdout,
            stderr,
            timed_out,
        })
    }
}

fn build_command(request: &ProcessRequest) -> Command {
    let mut command = Command::new(&request.program);
    command.args(&request.args);
    if let Some(dir) = &request.current_dir {
        command.current_dir(dir);
    }
    command
}

fn create_capture_file(
    program: &str,
    path: &PathBuf,
) -> Result<fs::File, ProcessExecutionError> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| ProcessExecutionError::Capture {
            program: program.to_string(),
            path: path.clone(),
            source,
        })
}

fn read_capture_file(program: &str, path: &PathBuf) -> Result<String, ProcessExecutionError> {
    fs::read_to_string(path).map_err(|source| ProcessExecutionError::Capture {
        program: program.to_string(),
        path: path.clone(),
        source,
    })
}

fn temp_output_path(stream: &str) -> PathBuf {
    let counter = OUTPUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    std::env::temp_dir().join(format!("swell-capture-{stream}-{pid}-{counter}.log"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_stderr() {
        let runner = SystemProcessRunner;
        let request = ProcessRequest::new("sh").args(["-c", "echo out; echo err >&2"]);
        let output = runner.run(&request).unwrap();
        assert!(output.success);
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("out"));
        assert!(output.stderr.contains("err"));
        assert!(!output.timed_out);
    }

    #[test]
    fn captures_non_zero_exit() {
        let runner = SystemProcessRunner;
        let request = ProcessRequest::new("sh").args(["-c", "echo boom >&2; exit 7"]);
        let output = runner.run(&request).unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, 7);
        assert!(output.stderr.contains("boom"));
    }

    #[test]
    fn stdin_reaches_the_child() {
        let runner = SystemProcessRunner;
        let request = ProcessRequest::new("cat").stdin("hello stdin");
        let output = runner.run(&request).unwrap();
        assert_eq!(output.stdout, "hello stdin");
    }

    #[test]
    fn missing_executable_is_spawn_failure() {
        let runner = SystemProcessRunner;
        let request = ProcessRequest::new("__swell_missing_executable__");
        match runner.run(&request) {
            Err(ProcessExecutionError::Spawn { .. }) => {}
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[test]
    fn timeout_kills_the_child_and_flags_the_output() {
        let runner = SystemProcessRunner;
        let request = ProcessRequest::new("sh").args(["-c", "echo started; sleep 30"]);
        let output = runner
            .run_with_timeout(&request, Duration::from_millis(200))
            .unwrap();
        assert!(output.timed_out);
        assert!(!output.success);
        assert!(output.stdout.contains("started"));
    }

    #[test]
    fn detail_prefers_stderr() {
        let output = ProcessOutput {
            exit_code: 1,
            success: false,
            stdout: "ignored".to_string(),
            stderr: "the reason".to_string(),
            timed_out: false,
        };
        assert_eq!(output.detail(), "the reason");
    }
}
