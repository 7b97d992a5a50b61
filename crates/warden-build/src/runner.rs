//! Allowlisted test execution

use crate::error::BuildError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use warden_core::{tail_str, TestConfig};

/// The command that will run, and what it replaced if anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSelection {
    pub command: String,
    /// Requested command that failed the allowlist
    pub rejected: Option<String>,
}

/// Result of one test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    pub command: String,
    pub ok: bool,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    /// Tail of combined stdout and stderr
    pub output: String,
}

/// Runs allowlisted test commands as argument vectors, never through a shell.
#[derive(Debug, Clone)]
pub struct TestRunner {
    repo_root: PathBuf,
    config: TestConfig,
}

impl TestRunner {
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>, config: TestConfig) -> Self {
        Self {
            repo_root: repo_root.into(),
            config,
        }
    }

    #[inline]
    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Exact match, or an allowlisted command followed by extra arguments
    #[must_use]
    pub fn is_allowed(&self, command: &str) -> bool {
        let command = command.trim();
        self.config.allowlist.iter().any(|allowed| {
            command == allowed
                || command
                    .strip_prefix(allowed.as_str())
                    .is_some_and(|rest| rest.starts_with(' '))
        })
    }

    /// Pick the first requested command, falling back to the default
    #[must_use]
    pub fn select(&self, requested: &[String]) -> TestSelection {
        let default = || self.config.default_command.clone();
        match requested.first().map(|cmd| cmd.trim()) {
            None | Some("") => TestSelection {
                command: default(),
                rejected: None,
            },
            Some(cmd) if self.is_allowed(cmd) => TestSelection {
                command: cmd.to_string(),
                rejected: None,
            },
            Some(cmd) => TestSelection {
                command: default(),
                rejected: Some(cmd.to_string()),
            },
        }
    }

    /// Run `command` in the repository under the configured timeout.
    ///
    /// The child is killed if the timeout fires.
    ///
    /// # Errors
    /// [`BuildError::TestSpawn`] when the process cannot be started or waited on
    pub async fn run(&self, command: &str) -> Result<TestRun, BuildError> {
        let spawn_error = |source| BuildError::TestSpawn {
            command: command.to_string(),
            source,
        };
        let mut argv = command.split_whitespace();
        let Some(program) = argv.next() else {
            return Err(spawn_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command",
            )));
        };

        tracing::info!(%command, root = %self.repo_root.display(), "running tests");
        let child = Command::new(program)
            .args(argv)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let limit = self.config.output_tail_bytes;
        match tokio::time::timeout(self.config.timeout(), child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                let run = TestRun {
                    command: command.to_string(),
                    ok: output.status.success(),
                    timed_out: false,
                    exit_code: output.status.code(),
                    output: tail_str(&combined, limit).to_string(),
                };
                tracing::info!(%command, ok = run.ok, exit_code = ?run.exit_code, "tests finished");
                Ok(run)
            }
            Ok(Err(source)) => Err(spawn_error(source)),
            Err(_) => {
                tracing::warn!(%command, timeout_secs = self.config.timeout_secs, "tests timed out");
                Ok(TestRun {
                    command: command.to_string(),
                    ok: false,
                    timed_out: true,
                    exit_code: None,
                    output: format!("Tests timed out after {}s", self.config.timeout_secs),
                })
            }
        }
    }
}
