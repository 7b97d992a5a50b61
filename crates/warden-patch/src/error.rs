//! Patch errors

use std::path::PathBuf;
use warden_core::ErrorKind;

/// Why a diff was refused or could not be applied
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Blank diff
    #[error("empty diff provided")]
    Empty,

    /// Diff over the byte ceiling
    #[error("diff is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },

    /// Structural problem at a 1-based diff line
    #[error("malformed diff at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// Nothing parseable
    #[error("could not parse any files from diff")]
    NoFiles,

    /// `..` component
    #[error("path traversal rejected: {0}")]
    PathTraversal(String),

    /// Absolute or drive-qualified path
    #[error("absolute path rejected: {0}")]
    AbsolutePath(String),

    /// Resolves outside the repository root (e.g. through a symlink)
    #[error("path escapes repository root: {0}")]
    OutsideRoot(String),

    /// Context or removed line does not match the file
    #[error("context mismatch in {path}, hunk {hunk}: expected {expected:?} at line {line}")]
    ContextMismatch {
        path: String,
        hunk: usize,
        line: usize,
        expected: String,
    },

    /// Modification or deletion of a file that does not exist
    #[error("target file not found: {0}")]
    MissingTarget(String),

    /// Creation of a file that already exists
    #[error("file already exists: {0}")]
    AlreadyExists(String),

    /// Deletion patch leaves content behind
    #[error("deletion of {0} does not remove all content")]
    IncompleteDeletion(String),

    /// Revert asked for a backup that is not there
    #[error("backup not found: {0}")]
    BackupMissing(PathBuf),

    /// Filesystem failure
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backup manifest unreadable
    #[error("backup manifest invalid: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl PatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }

    /// Position in the failure taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Empty
            | Self::TooLarge { .. }
            | Self::Malformed { .. }
            | Self::NoFiles
            | Self::PathTraversal(_)
            | Self::AbsolutePath(_)
            | Self::OutsideRoot(_) => ErrorKind::Validation,
            Self::ContextMismatch { .. }
            | Self::MissingTarget(_)
            | Self::AlreadyExists(_)
            | Self::IncompleteDeletion(_)
            | Self::BackupMissing(_)
            | Self::Io { .. }
            | Self::Manifest(_) => ErrorKind::Apply,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}
