//! Diff validation: size cap, parse, path confinement

use crate::diff::{parse, Diff};
use crate::error::PatchError;
use std::path::{Component, Path, PathBuf};

/// Check an untrusted diff without touching the repository.
///
/// Rejects blank or oversized input, diffs with no parseable files, and any
/// path that is absolute, contains `..`, or resolves outside `repo_root`.
///
/// # Errors
/// The first validation failure found
pub fn validate_diff(text: &str, repo_root: &Path, max_bytes: usize) -> Result<Diff, PatchError> {
    if text.trim().is_empty() {
        return Err(PatchError::Empty);
    }
    if text.len() > max_bytes {
        return Err(PatchError::TooLarge {
            size: text.len(),
            max: max_bytes,
        });
    }
    let diff = parse(text)?;
    if diff.files.is_empty() {
        return Err(PatchError::NoFiles);
    }
    for path in diff.paths() {
        check_path(repo_root, &path)?;
    }
    Ok(diff)
}

/// Confine one diff path to `repo_root`
///
/// # Errors
/// [`PatchError::AbsolutePath`], [`PatchError::PathTraversal`] or
/// [`PatchError::OutsideRoot`]
pub fn check_path(repo_root: &Path, path: &str) -> Result<PathBuf, PatchError> {
    if path.is_empty() || path.contains('\0') {
        return Err(PatchError::PathTraversal(path.to_string()));
    }
    if path.starts_with('/') || path.starts_with('\\') || has_drive_prefix(path) {
        return Err(PatchError::AbsolutePath(path.to_string()));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PatchError::PathTraversal(path.to_string()));
    }

    let relative = Path::new(path);
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err(PatchError::PathTraversal(path.to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PatchError::AbsolutePath(path.to_string()))
            }
        }
    }

    let full = repo_root.join(relative);
    let root = repo_root
        .canonicalize()
        .map_err(|e| PatchError::io(repo_root, e))?;
    let existing = deepest_existing(&full);
    let resolved = existing
        .canonicalize()
        .map_err(|e| PatchError::io(&existing, e))?;
    if !resolved.starts_with(&root) {
        return Err(PatchError::OutsideRoot(path.to_string()));
    }
    Ok(full)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Closest ancestor of `path` (or `path` itself) that exists on disk
fn deepest_existing(path: &Path) -> PathBuf {
    let mut current = path;
    loop {
        if current.symlink_metadata().is_ok() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return PathBuf::from("."),
        }
    }
}
