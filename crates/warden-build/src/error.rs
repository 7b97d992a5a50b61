//! Build loop errors

use std::path::PathBuf;
use thiserror::Error;
use warden_core::ErrorKind;

/// Failures inside one build attempt.
///
/// Governance refusals are not errors; they come back as plain messages.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The patch provider could not produce a proposal
    #[error("patch provider failed: {0}")]
    Provider(String),

    /// The test command could not be started
    #[error("failed to start test command `{command}`: {source}")]
    TestSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The world mutator refused or failed
    #[error("world mutation failed: {0}")]
    World(String),

    /// Something in the pipeline panicked; the payload text is kept
    #[error("build panicked: {0}")]
    Panicked(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Where this failure sits in the outcome taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TestSpawn { .. } => ErrorKind::Test,
            Self::World(_) => ErrorKind::Apply,
            Self::Provider(_) | Self::Panicked(_) | Self::Io { .. } => ErrorKind::Unexpected,
        }
    }
}
