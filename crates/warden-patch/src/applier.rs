//! Patch application with backup and rollback

use crate::backup::{backup_dir_for, restore, snapshot, BackupManifest};
use crate::diff::Diff;
use crate::engine::apply_hunks;
use crate::error::PatchError;
use crate::validate::validate_diff;
use crate::vcs::{git_apply, VcsSkip};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use warden_core::{ErrorKind, EventId, PatchConfig};
use warden_evidence::Sha256Digest;

/// Outcome of an apply or revert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchResult {
    pub success: bool,
    pub message: String,
    pub modified_files: Vec<String>,
    pub backup_path: Option<PathBuf>,
    /// SHA-256 of the raw diff text
    pub sha256: Option<Sha256Digest>,
    pub patch_file: Option<PathBuf>,
    /// Set on failure
    pub failure: Option<ErrorKind>,
}

impl PatchResult {
    fn failed(error: &PatchError, sha256: Option<Sha256Digest>) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            modified_files: Vec::new(),
            backup_path: None,
            sha256,
            patch_file: None,
            failure: Some(error.kind()),
        }
    }
}

/// One staged file operation, computed before anything is written
#[derive(Debug)]
enum Change {
    Write(String),
    Delete,
}

/// Applies untrusted unified diffs inside one repository root.
///
/// Each apply saves the raw diff under `patches_dir`, snapshots every target
/// into an event-scoped backup directory, then applies either through the
/// optional VCS accelerator or the built-in hunk engine. The hunk engine
/// computes every file's new content before writing any of them.
#[derive(Debug, Clone)]
pub struct PatchApplier {
    repo_root: PathBuf,
    patches_dir: PathBuf,
    config: PatchConfig,
}

impl PatchApplier {
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>, patches_dir: impl Into<PathBuf>, config: PatchConfig) -> Self {
        Self {
            repo_root: repo_root.into(),
            patches_dir: patches_dir.into(),
            config,
        }
    }

    #[inline]
    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    #[inline]
    #[must_use]
    pub fn patches_dir(&self) -> &Path {
        &self.patches_dir
    }

    /// Size cap, parse and path confinement; no filesystem writes
    ///
    /// # Errors
    /// The first validation failure
    pub fn validate(&self, diff: &str) -> Result<Diff, PatchError> {
        validate_diff(diff, &self.repo_root, self.config.max_diff_bytes)
    }

    /// Validate, save, back up and apply `diff` for `event_id`
    pub fn apply(&self, diff: &str, event_id: &EventId) -> PatchResult {
        let sha256 = Sha256Digest::compute(diff.as_bytes());
        let parsed = match self.validate(diff) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(event_id = %event_id, %error, "diff rejected");
                return PatchResult::failed(&error, Some(sha256));
            }
        };

        let stem = format!("{}_{event_id}", Utc::now().format("%Y%m%d_%H%M%S"));
        let patch_file = self.patches_dir.join(format!("{stem}.patch"));
        let backup_dir = backup_dir_for(&self.patches_dir, &stem);

        match self.apply_validated(diff, &parsed, event_id, sha256, &patch_file, &backup_dir) {
            Ok((message, modified_files)) => {
                tracing::info!(event_id = %event_id, files = modified_files.len(), %message, "patch applied");
                PatchResult {
                    success: true,
                    message,
                    modified_files,
                    backup_path: Some(backup_dir),
                    sha256: Some(sha256),
                    patch_file: Some(patch_file),
                    failure: None,
                }
            }
            Err(error) => {
                tracing::warn!(event_id = %event_id, %error, "patch apply failed");
                let mut result = PatchResult::failed(&error, Some(sha256));
                result.backup_path = backup_dir.is_dir().then_some(backup_dir);
                result.patch_file = patch_file.is_file().then_some(patch_file);
                result
            }
        }
    }

    /// Restore everything recorded in `backup_path`
    pub fn revert(&self, backup_path: &Path) -> PatchResult {
        match restore(&self.repo_root, backup_path) {
            Ok(files) => {
                tracing::info!(backup = %backup_path.display(), files = files.len(), "patch reverted");
                PatchResult {
                    success: true,
                    message: format!("Reverted {} files", files.len()),
                    modified_files: files,
                    backup_path: Some(backup_path.to_path_buf()),
                    sha256: None,
                    patch_file: None,
                    failure: None,
                }
            }
            Err(error) => {
                tracing::error!(backup = %backup_path.display(), %error, "revert failed");
                let mut result = PatchResult::failed(&error, None);
                result.backup_path = Some(backup_path.to_path_buf());
                result
            }
        }
    }

    fn apply_validated(
        &self,
        diff: &str,
        parsed: &Diff,
        event_id: &EventId,
        sha256: Sha256Digest,
        patch_file: &Path,
        backup_dir: &Path,
    ) -> Result<(String, Vec<String>), PatchError> {
        fs::create_dir_all(&self.patches_dir).map_err(|e| PatchError::io(&self.patches_dir, e))?;
        fs::write(patch_file, diff).map_err(|e| PatchError::io(patch_file, e))?;

        let paths = parsed.paths();
        let manifest = BackupManifest {
            event_id: event_id.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            diff_sha256: sha256.to_string(),
            ..BackupManifest::default()
        };
        snapshot(&self.repo_root, backup_dir, &paths, manifest)?;

        if self.config.use_vcs {
            match git_apply(&self.config.vcs_binary, &self.repo_root, diff) {
                Ok(()) => return Ok(("Applied via git apply".to_string(), targets(parsed))),
                Err(VcsSkip::Unavailable(error)) => {
                    tracing::debug!(%error, "vcs accelerator unavailable, using hunk engine");
                }
                Err(VcsSkip::Refused(stderr)) => {
                    tracing::debug!(%stderr, "vcs accelerator refused diff, using hunk engine");
                }
            }
        }

        let staged = self.stage(parsed)?;
        if let Err(error) = self.commit(&staged) {
            // Some files may already be written; put everything back.
            if let Err(revert_error) = restore(&self.repo_root, backup_dir) {
                tracing::error!(%revert_error, "rollback after failed write also failed");
            }
            return Err(error);
        }
        let modified: Vec<String> = staged.into_iter().map(|(path, _)| path).collect();
        Ok((format!("Applied manually to {} files", modified.len()), modified))
    }

    /// Compute final content for every touched path without writing
    fn stage(&self, diff: &Diff) -> Result<Vec<(String, Change)>, PatchError> {
        let mut staged: Vec<(String, Change)> = Vec::new();

        for file in &diff.files {
            let original = match &file.old_path {
                None => {
                    let target = file.target();
                    let pending = staged.iter().find(|(p, _)| p == target).map(|(_, c)| c);
                    let exists = match pending {
                        Some(Change::Delete) => false,
                        Some(Change::Write(_)) => true,
                        None => self.repo_root.join(target).exists(),
                    };
                    if exists {
                        return Err(PatchError::AlreadyExists(target.to_string()));
                    }
                    String::new()
                }
                Some(old) => self.current_content(&staged, old)?,
            };

            let content = apply_hunks(file.target(), &original, &file.hunks)?;

            match (&file.old_path, &file.new_path) {
                (Some(old), None) => {
                    if !content.is_empty() {
                        return Err(PatchError::IncompleteDeletion(old.clone()));
                    }
                    upsert(&mut staged, old, Change::Delete);
                }
                (Some(old), Some(new)) if old != new => {
                    if self.repo_root.join(new).exists() {
                        return Err(PatchError::AlreadyExists(new.clone()));
                    }
                    upsert(&mut staged, old, Change::Delete);
                    upsert(&mut staged, new, Change::Write(content));
                }
                (_, Some(new)) => upsert(&mut staged, new, Change::Write(content)),
                (None, None) => {}
            }
        }
        Ok(staged)
    }

    fn current_content(&self, staged: &[(String, Change)], rel: &str) -> Result<String, PatchError> {
        match staged.iter().find(|(p, _)| p == rel).map(|(_, c)| c) {
            Some(Change::Write(content)) => return Ok(content.clone()),
            Some(Change::Delete) => return Err(PatchError::MissingTarget(rel.to_string())),
            None => {}
        }
        let path = self.repo_root.join(rel);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PatchError::MissingTarget(rel.to_string()))
            }
            Err(e) => Err(PatchError::io(path, e)),
        }
    }

    fn commit(&self, staged: &[(String, Change)]) -> Result<(), PatchError> {
        for (rel, change) in staged {
            let path = self.repo_root.join(rel);
            match change {
                Change::Write(content) => {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent).map_err(|e| PatchError::io(parent, e))?;
                    }
                    fs::write(&path, content).map_err(|e| PatchError::io(&path, e))?;
                }
                Change::Delete => match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(PatchError::io(path, e)),
                },
            }
        }
        Ok(())
    }
}

fn upsert(staged: &mut Vec<(String, Change)>, path: &str, change: Change) {
    match staged.iter_mut().find(|(p, _)| p == path) {
        Some(slot) => slot.1 = change,
        None => staged.push((path.to_string(), change)),
    }
}

fn targets(diff: &Diff) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for file in &diff.files {
        let target = file.target().to_string();
        if !out.contains(&target) {
            out.push(target);
        }
    }
    out
}
