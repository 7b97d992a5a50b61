//! Evidence read errors
//!
//! Appends never surface errors; these cover reading and verifying files.

/// Evidence file read failure
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("evidence io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("evidence json error: {0}")]
    Json(#[from] serde_json::Error),
}
