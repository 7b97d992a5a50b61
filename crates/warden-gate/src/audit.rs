//! Structured command audit trail

use crate::error::AuditError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use warden_core::{Actor, AuditConfig, EventId, Role};
use warden_evidence::EvidenceLog;

/// Outcome of one gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Allowed,
    Denied,
    RateLimited,
}

impl AuditResult {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuditResult::Allowed => "allowed",
            AuditResult::Denied => "denied",
            AuditResult::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit line as written to the evidence log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: String,
    pub event: String,
    pub actor: String,
    pub role: Role,
    pub source: String,
    pub cmd_text: String,
    pub result: AuditResult,
    pub reason: String,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_chars: Option<usize>,
}

/// Command text after applying the character cap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CappedCommand {
    pub text: String,
    /// Character count before truncation, when truncation happened
    pub original_chars: Option<usize>,
}

impl CappedCommand {
    #[inline]
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.original_chars.is_some()
    }
}

/// Validates raw input sizes and records every gate decision
#[derive(Debug, Clone)]
pub struct AuditLogger {
    log: Arc<EvidenceLog>,
    config: AuditConfig,
}

impl AuditLogger {
    #[must_use]
    pub fn new(log: Arc<EvidenceLog>, config: AuditConfig) -> Self {
        Self { log, config }
    }

    #[inline]
    #[must_use]
    pub fn log(&self) -> &Arc<EvidenceLog> {
        &self.log
    }

    /// Reject raw messages over the byte cap
    ///
    /// # Errors
    /// Returns [`AuditError::MessageTooLarge`] when the UTF-8 length exceeds the cap
    pub fn validate_message(&self, raw: &str) -> Result<(), AuditError> {
        let actual = raw.len();
        if actual > self.config.max_message_bytes {
            return Err(AuditError::MessageTooLarge {
                actual,
                max: self.config.max_message_bytes,
            });
        }
        Ok(())
    }

    /// Cut command text to the character cap
    #[must_use]
    pub fn cap_command(&self, cmd_text: &str) -> CappedCommand {
        let max = self.config.max_command_chars;
        let chars = cmd_text.chars().count();
        if chars <= max {
            return CappedCommand {
                text: cmd_text.to_string(),
                original_chars: None,
            };
        }
        CappedCommand {
            text: cmd_text.chars().take(max).collect(),
            original_chars: Some(chars),
        }
    }

    /// Append one decision record and return it
    pub fn record(
        &self,
        actor: &Actor,
        cmd_text: &str,
        result: AuditResult,
        reason: &str,
    ) -> AuditRecord {
        let capped = self.cap_command(cmd_text);
        let record = AuditRecord {
            id: EventId::with_prefix("audit").to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            event: "command_audit".to_string(),
            actor: actor.id.to_string(),
            role: actor.role,
            source: self.config.source.clone(),
            truncated: capped.is_truncated(),
            original_chars: capped.original_chars,
            cmd_text: capped.text,
            result,
            reason: reason.to_string(),
        };

        match serde_json::to_value(&record) {
            Ok(value) => {
                self.log.append(value);
            }
            Err(error) => tracing::warn!(%error, "audit record not serializable"),
        }
        tracing::debug!(
            actor = %actor.id,
            role = %actor.role,
            result = %result,
            reason,
            "gate decision"
        );
        record
    }
}
