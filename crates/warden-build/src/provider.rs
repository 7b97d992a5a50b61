//! The untrusted patch-proposal seam

use crate::context::RepoContext;
use crate::error::BuildError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use warden_core::{ActorId, EventId};

/// Everything a provider is told about the requested change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchRequest {
    pub event_id: EventId,
    pub actor: ActorId,
    pub verb: String,
    pub args: Map<String, Value>,
    pub intent: String,
    pub context: RepoContext,
}

/// What a provider hands back. Nothing in it is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchProposal {
    pub diff: String,
    pub notes: String,
    pub test_commands: Vec<String>,
}

/// Source of proposed diffs (a code model, a human, a canned fixture)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatchProvider: Send + Sync {
    /// Propose a diff for `request`
    ///
    /// # Errors
    /// [`BuildError::Provider`] when no proposal could be produced
    async fn propose(&self, request: &PatchRequest) -> Result<PatchProposal, BuildError>;
}

const ROOM_DIFF: &str = r#"--- a/world/world_data.json
+++ b/world/world_data.json
@@ -1,3 +1,9 @@
 {
-  "rooms": []
+  "rooms": [
+    {
+      "id": "test_cabin",
+      "name": "Cabin",
+      "description": "A simple cabin in the woods."
+    }
+  ]
 }
"#;

const DEFAULT_DIFF: &str = "--- /dev/null
+++ b/test_file.txt
@@ -0,0 +1 @@
+# Stub edit from warden
";

/// Canned proposals for wiring tests and dry runs
#[derive(Debug, Clone)]
pub struct StubProvider {
    test_command: String,
}

impl StubProvider {
    #[must_use]
    pub fn new(test_command: impl Into<String>) -> Self {
        Self {
            test_command: test_command.into(),
        }
    }
}

#[async_trait]
impl PatchProvider for StubProvider {
    async fn propose(&self, request: &PatchRequest) -> Result<PatchProposal, BuildError> {
        let verb = request.verb.to_lowercase();
        let (diff, notes) = if verb.starts_with("build room") {
            (ROOM_DIFF, format!("[STUB] Adding room from intent: {}", request.intent))
        } else {
            (DEFAULT_DIFF, format!("[STUB] Default stub patch for verb: {verb}"))
        };
        Ok(PatchProposal {
            diff: diff.to_string(),
            notes,
            test_commands: vec![self.test_command.clone()],
        })
    }
}
