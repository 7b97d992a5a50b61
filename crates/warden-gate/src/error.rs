//! Audit validation errors

/// Raw input rejected before any command interpretation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// Raw message exceeds the byte cap
    #[error("message exceeds {max} bytes ({actual} bytes)")]
    MessageTooLarge { actual: usize, max: usize },
}
