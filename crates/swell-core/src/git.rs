//! Narrow version-control adapter.
//!
//! The engine drives git through a deliberately small surface: short
//! status, name-only diff, stage-all, commit, log, and a plain reset used
//! only to un-stage after a failed commit. Hard resets, force-pushes,
//! rebases, and amends are never invoked. All operations run in the project
//! directory and convert non-zero exits into [`CoreError::Process`].

use std::path::{Path, PathBuf};

use crate::errors::{CoreError, CoreResult};
use crate::process::{ProcessOutput, ProcessRequest, ProcessRunner};

/// Git operations scoped to one repository.
pub struct GitAdapter<'a> {
    runner: &'a dyn ProcessRunner,
    repo_root: PathBuf,
}

/// One commit from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full commit hash.
    pub hash: String,
    /// Subject line.
    pub subject: String,
}

impl<'a> GitAdapter<'a> {
    /// Create an adapter for the repository at `repo_root`.
    pub fn new(runner: &'a dyn ProcessRunner, repo_root: &Path) -> Self {
        Self {
            runner,
            repo_root: repo_root.to_path_buf(),
        }
    }

    /// `git status --short` lines, trimmed, empty lines dropped.
    pub fn status_short(&self) -> CoreResult<Vec<String>> {
        let output = self.run(&["status", "--short"])?;
        Ok(output
            .stdout
            .lines()
            .map(str::to_string)
            .filter(|l| !l.trim().is_empty())
            .collect())
    }

    /// Paths with any working-tree change, untracked files included.
    ///
    /// Parsed from short status: the two-column state prefix is dropped and
    /// rename arrows resolve to the new path.
    pub fn modified_files(&self) -> CoreResult<Vec<String>> {
        let mut files = Vec::new();
        for line in self.status_short()? {
            if line.len() < 4 {
                continue;
            }
            let path = line[3..].trim();
            let path = match path.split_once(" -> ") {
                Some((_, renamed)) => renamed,
                None => path,
            };
            if !path.is_empty() {
                files.push(path.trim_matches('"').to_string());
            }
        }
        Ok(files)
    }

    /// `git diff --name-only <range>`.
    pub fn changed_files(&self, range: &str) -> CoreResult<Vec<String>> {
        let output = self.run(&["diff", "--name-only", range])?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Every path changed since the previous checkpoint: tracked changes
    /// against `HEAD` plus untracked files from short status. A repository
    /// with no commits yet has no `HEAD` to diff against; short status
    /// alone is the full answer there.
    pub fn changed_since_head(&self) -> CoreResult<Vec<String>> {
        let mut files = match self.changed_files("HEAD") {
            Ok(files) => files,
            Err(err) => {
                tracing::debug!(error = %err, "diff against HEAD unavailable; using status only");
                Vec::new()
            }
        };
        for path in self.modified_files()? {
            if !files.contains(&path) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// `git add -A`.
    pub fn stage_all(&self) -> CoreResult<()> {
        self.run(&["add", "-A"]).map(|_| ())
    }

    /// `git commit -m <message>`. The raw failure detail is returned so the
    /// checkpoint gate can wrap it in its own error kind.
    pub fn commit(&self, message: &str) -> Result<(), String> {
        let request = ProcessRequest::new("git")
            .args(["commit", "-m", message])
            .current_dir(&self.repo_root);
        match self.runner.run(&request) {
            Ok(output) if output.success => Ok(()),
            Ok(output) => Err(output.detail()),
            Err(err) => Err(err.to_string()),
        }
    }

    /// Plain `git reset`: un-stages everything, leaves the working tree
    /// untouched. Used only to roll back after a failed commit.
    pub fn reset_index(&self) -> CoreResult<()> {
        self.run(&["reset"]).map(|_| ())
    }

    /// The `k` most recent commits, newest first.
    pub fn recent_commits(&self, k: usize) -> CoreResult<Vec<CommitInfo>> {
        let count = k.to_string();
        let output = self.run(&["log", "--format=%H %s", "-n", &count])?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| {
                let (hash, subject) = line.split_once(' ')?;
                Some(CommitInfo {
                    hash: hash.to_string(),
                    subject: subject.to_string(),
                })
            })
            .collect())
    }

    /// The current head commit hash, when any commit exists.
    pub fn head_commit(&self) -> CoreResult<Option<String>> {
        Ok(self.recent_commits(1)?.into_iter().next().map(|c| c.hash))
    }

    fn run(&self, args: &[&str]) -> CoreResult<ProcessOutput> {
        let request = ProcessRequest::new("git")
            .args(args.iter().copied())
            .current_dir(&self.repo_root);
        let output = self
            .runner
            .run(&request)
            .map_err(|err| CoreError::process(format!("git {}: {err}", args.join(" "))))?;
        if !output.success {
            return Err(CoreError::process(format!(
                "git {} failed ({})",
                args.join(" "),
                output.detail()
            )));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::test_support::StubRunner;

    #[test]
    fn modified_files_parses_short_status() {
        let runner = StubRunner::with_outputs(vec![StubRunner::ok(
            " M src/lib.rs\n?? notes.md\nR  old.rs -> new.rs\n",
        )]);
        let td = tempfile::tempdir().unwrap();
        let git = GitAdapter::new(&runner, td.path());
        let files = git.modified_files().unwrap();
        assert_eq!(files, vec!["src/lib.rs", "notes.md", "new.rs"]);
    }

    #[test]
    fn changed_since_head_merges_diff_and_untracked() {
        let runner = StubRunner::with_outputs(vec![
            StubRunner::ok("src/lib.rs\n"),
            StubRunner::ok(" M src/lib.rs\n?? brand_new.rs\n"),
        ]);
        let td = tempfile::tempdir().unwrap();
        let git = GitAdapter::new(&runner, td.path());
        let files = git.changed_since_head().unwrap();
        assert_eq!(files, vec!["src/lib.rs", "brand_new.rs"]);
    }

    #[test]
    fn failed_git_command_is_a_process_error() {
        let runner =
            StubRunner::with_outputs(vec![StubRunner::err("fatal: not a git repository")]);
        let td = tempfile::tempdir().unwrap();
        let git = GitAdapter::new(&runner, td.path());
        let err = git.status_short().unwrap_err();
        match err {
            CoreError::Process(msg) => assert!(msg.contains("not a git repository")),
            other => panic!("expected process error, got {other:?}"),
        }
    }

    #[test]
    fn commit_failure_returns_detail_for_the_gate() {
        let runner = StubRunner::with_outputs(vec![StubRunner::err("hook declined")]);
        let td = tempfile::tempdir().unwrap();
        let git = GitAdapter::new(&runner, td.path());
        let err = git.commit("[CHECKPOINT] Wave 1 complete").unwrap_err();
        assert!(err.contains("hook declined"));
    }

    #[test]
    fn recent_commits_parses_hash_and_subject() {
        let runner = StubRunner::with_outputs(vec![StubRunner::ok(
            "abc123 [CHECKPOINT] Wave 1 complete\ndef456 initial\n",
        )]);
        let td = tempfile::tempdir().unwrap();
        let git = GitAdapter::new(&runner, td.path());
        let commits = git.recent_commits(2).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc123");
        assert_eq!(commits[0].subject, "[CHECKPOINT] Wave 1 complete");
    }
}
