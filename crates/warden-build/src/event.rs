//! Build events as written to the evidence log
//!
//! A build writes its event once as `pending` and again with the terminal
//! outcome under the same id; readers keep the last line per id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use warden_core::{ActorId, BuildOutcome, EventId};

/// Patch facts recorded on a build event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub files: Vec<String>,
}

/// Test-run facts recorded on a build event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMeta {
    pub ran: bool,
    pub cmd: String,
    pub ok: bool,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub output_tail: String,
}

/// One build or world-mutation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEvent {
    pub id: EventId,
    pub event: String,
    pub created_at: String,
    pub actor: ActorId,
    /// `BUILD` for gated attempts, `IDLE` when the kill switch blocked it
    pub mode: String,
    pub verb: String,
    pub args: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub result: BuildOutcome,
    /// Always false here; committing is a separate step
    pub durable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BuildEvent {
    #[must_use]
    pub fn new(actor: &ActorId, verb: &str, args: Map<String, Value>, created_at: String) -> Self {
        Self {
            id: EventId::new(),
            event: "build".to_string(),
            created_at,
            actor: actor.clone(),
            mode: "BUILD".to_string(),
            verb: verb.to_string(),
            args,
            intent: None,
            result: BuildOutcome::Pending,
            durable: false,
            patch: None,
            tests: None,
            error: None,
        }
    }

    /// The event as an evidence-log entry
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|error| {
            tracing::error!(event_id = %self.id, %error, "build event did not serialize");
            serde_json::json!({
                "id": self.id,
                "event": self.event,
                "result": self.result,
                "error": error.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_event_omits_empty_sections() {
        let event = BuildEvent::new(&ActorId::new("alice"), "build", Map::new(), "t0".to_string());
        let value = event.to_value();
        assert_eq!(value["result"], "pending");
        assert_eq!(value["mode"], "BUILD");
        assert_eq!(value["durable"], false);
        assert!(value.get("patch").is_none());
        assert!(value.get("tests").is_none());
        assert!(value["id"].as_str().unwrap().starts_with("evt_"));
    }
}
