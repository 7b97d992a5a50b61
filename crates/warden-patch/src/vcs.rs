//! Optional `git apply` accelerator

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Why the accelerator did not apply the diff
#[derive(Debug)]
pub(crate) enum VcsSkip {
    /// Binary could not be started
    Unavailable(std::io::Error),
    /// `--check` or the real apply refused the diff
    Refused(String),
}

/// Dry-run with `--check`, then apply for real. Both read the diff from stdin.
pub(crate) fn git_apply(binary: &str, repo_root: &Path, diff: &str) -> Result<(), VcsSkip> {
    run(binary, repo_root, &["apply", "--check", "-"], diff)?;
    run(binary, repo_root, &["apply", "-"], diff)
}

fn run(binary: &str, repo_root: &Path, args: &[&str], diff: &str) -> Result<(), VcsSkip> {
    let mut child = Command::new(binary)
        .args(args)
        .current_dir(repo_root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(VcsSkip::Unavailable)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(diff.as_bytes())
            .map_err(VcsSkip::Unavailable)?;
    }
    let output = child.wait_with_output().map_err(VcsSkip::Unavailable)?;
    if output.status.success() {
        Ok(())
    } else {
        Err(VcsSkip::Refused(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}
