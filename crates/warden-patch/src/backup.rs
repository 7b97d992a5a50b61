//! Event-scoped backups and restore

use crate::error::PatchError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the manifest inside a backup directory
pub const MANIFEST_FILE: &str = "manifest.json";
/// Subdirectory holding copies of the original files
pub const FILES_DIR: &str = "files";

/// What a backup holds and what a revert must undo
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub event_id: String,
    pub created_at: String,
    pub diff_sha256: String,
    /// Files copied under `files/`, restored on revert
    pub backed_up: Vec<String>,
    /// Files absent before the patch, deleted on revert
    pub created: Vec<String>,
}

/// Snapshot every touched path that exists; record the rest as created
///
/// # Errors
/// Returns error if a copy or the manifest write fails
pub(crate) fn snapshot(
    repo_root: &Path,
    backup_dir: &Path,
    paths: &[String],
    mut manifest: BackupManifest,
) -> Result<BackupManifest, PatchError> {
    let files_dir = backup_dir.join(FILES_DIR);
    fs::create_dir_all(&files_dir).map_err(|e| PatchError::io(&files_dir, e))?;

    for rel in paths {
        let source = repo_root.join(rel);
        if source.is_file() {
            let dest = files_dir.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| PatchError::io(parent, e))?;
            }
            fs::copy(&source, &dest).map_err(|e| PatchError::io(&source, e))?;
            manifest.backed_up.push(rel.clone());
        } else {
            manifest.created.push(rel.clone());
        }
    }

    let manifest_path = backup_dir.join(MANIFEST_FILE);
    let body = serde_json::to_string_pretty(&manifest)?;
    fs::write(&manifest_path, body).map_err(|e| PatchError::io(&manifest_path, e))?;
    Ok(manifest)
}

/// Restore backed-up files and remove created ones; returns touched paths
///
/// A directory without a manifest is restored by walking it, every file
/// mapped back to the same relative location.
///
/// # Errors
/// [`PatchError::BackupMissing`] when `backup_dir` does not exist, or I/O errors
pub(crate) fn restore(repo_root: &Path, backup_dir: &Path) -> Result<Vec<String>, PatchError> {
    if !backup_dir.is_dir() {
        return Err(PatchError::BackupMissing(backup_dir.to_path_buf()));
    }

    let manifest_path = backup_dir.join(MANIFEST_FILE);
    let (files_dir, manifest) = if manifest_path.is_file() {
        let text = fs::read_to_string(&manifest_path).map_err(|e| PatchError::io(&manifest_path, e))?;
        let manifest: BackupManifest = serde_json::from_str(&text)?;
        (backup_dir.join(FILES_DIR), manifest)
    } else {
        (backup_dir.to_path_buf(), walk_manifest(backup_dir))
    };

    let mut touched = Vec::new();
    for rel in &manifest.backed_up {
        let source = files_dir.join(rel);
        let target = repo_root.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PatchError::io(parent, e))?;
        }
        fs::copy(&source, &target).map_err(|e| PatchError::io(&source, e))?;
        touched.push(rel.clone());
    }
    for rel in &manifest.created {
        let target = repo_root.join(rel);
        match fs::remove_file(&target) {
            Ok(()) => touched.push(rel.clone()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PatchError::io(target, e)),
        }
    }
    Ok(touched)
}

fn walk_manifest(dir: &Path) -> BackupManifest {
    let backed_up = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    BackupManifest {
        backed_up,
        ..BackupManifest::default()
    }
}

/// `<patches>/<stem>_backup`
#[must_use]
pub fn backup_dir_for(patches_dir: &Path, stem: &str) -> PathBuf {
    patches_dir.join(format!("{stem}_backup"))
}
