//! The build loop: the only path that spends a consented build cycle

use crate::context::gather_context;
use crate::error::BuildError;
use crate::event::{BuildEvent, PatchMeta, TestMeta};
use crate::governance::Governance;
use crate::provider::{PatchProvider, PatchRequest};
use crate::runner::{TestRun, TestRunner};
use crate::world::{self, WorldMutation, WorldMutator};
use chrono::SecondsFormat;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warden_core::{tail_str, ActorId, BuildOutcome, ErrorKind, EventId};
use warden_evidence::{EvidenceError, Sha256Digest};
use warden_patch::PatchApplier;

/// Reply when the global kill switch is on
pub const KILL_SWITCH_MESSAGE: &str = "Kill switch active: builds disabled.";

const ERROR_TAIL_BYTES: usize = 200;
const REPLY_TAIL_BYTES: usize = 300;

/// Drives one consented build from proposal to tested change.
///
/// Each attempt writes a `pending` event, then the same id again with its
/// terminal outcome. The actor's build cycle is spent right after `pending`
/// on every path except the kill switch, which never opened one.
pub struct BuildOrchestrator {
    governance: Arc<Governance>,
    provider: Arc<dyn PatchProvider>,
    applier: PatchApplier,
    runner: TestRunner,
    repo_root: PathBuf,
}

impl std::fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("repo_root", &self.repo_root)
            .field("applier", &self.applier)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl BuildOrchestrator {
    #[must_use]
    pub fn new(
        governance: Arc<Governance>,
        repo_root: impl Into<PathBuf>,
        provider: Arc<dyn PatchProvider>,
    ) -> Self {
        let repo_root = repo_root.into();
        let config = governance.config();
        let applier = PatchApplier::new(
            repo_root.clone(),
            config.evidence.patches_dir(),
            config.patch.clone(),
        );
        let runner = TestRunner::new(repo_root.clone(), config.tests.clone());
        Self {
            governance,
            provider,
            applier,
            runner,
            repo_root,
        }
    }

    #[inline]
    #[must_use]
    pub fn governance(&self) -> &Arc<Governance> {
        &self.governance
    }

    #[inline]
    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    #[inline]
    #[must_use]
    pub fn applier(&self) -> &PatchApplier {
        &self.applier
    }

    /// Run one build for `actor`.
    ///
    /// `intent` falls back to the actor's last `/plan` text. Always returns a
    /// message for the actor; failures are outcomes, not errors.
    pub async fn execute_build(
        &self,
        actor: &ActorId,
        verb: &str,
        args: Map<String, Value>,
        intent: Option<&str>,
    ) -> String {
        let mode = self.governance.mode();
        let mut event = BuildEvent::new(actor, verb, args, self.now());

        if mode.kill_switch() {
            tracing::warn!(actor = %actor, %verb, "build blocked by kill switch");
            event.mode = "IDLE".to_string();
            self.finish(&mut event, BuildOutcome::Blocked, Some(KILL_SWITCH_MESSAGE.to_string()));
            return KILL_SWITCH_MESSAGE.to_string();
        }

        event.intent = Some(
            intent
                .map(str::to_string)
                .or_else(|| mode.state(actor).last_plan_text)
                .unwrap_or_default(),
        );
        self.record(&event);

        if let Err(status) = mode.try_begin_build(actor) {
            tracing::info!(actor = %actor, event_id = %event.id, "build blocked by mode gate");
            return blocked_message(&status);
        }

        tracing::info!(actor = %actor, event_id = %event.id, %verb, "build started");
        let outcome = AssertUnwindSafe(self.run_pipeline(actor, &mut event))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(BuildError::Panicked(panic_message(payload.as_ref()))));
        match outcome {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(actor = %actor, event_id = %event.id, %error, "build errored");
                self.finish(&mut event, BuildOutcome::Error, Some(error.to_string()));
                format!("BUILD ERROR: {error}")
            }
        }
    }

    async fn run_pipeline(&self, actor: &ActorId, event: &mut BuildEvent) -> Result<String, BuildError> {
        let config = self.governance.config();
        let request = PatchRequest {
            event_id: event.id.clone(),
            actor: actor.clone(),
            verb: event.verb.clone(),
            args: event.args.clone(),
            intent: event.intent.clone().unwrap_or_default(),
            context: gather_context(&self.repo_root, &config.context),
        };
        let proposal = self.provider.propose(&request).await?;

        if proposal.diff.trim().is_empty() {
            let reason = if proposal.notes.trim().is_empty() {
                "No diff generated".to_string()
            } else {
                proposal.notes.clone()
            };
            tracing::warn!(event_id = %event.id, %reason, "provider returned no diff");
            self.finish(event, BuildOutcome::Error, Some(reason.clone()));
            return Ok(format!("BUILD FAILED: {reason}"));
        }

        event.patch = Some(PatchMeta {
            sha256: Some(Sha256Digest::compute(proposal.diff.as_bytes()).to_string()),
            ..PatchMeta::default()
        });
        if let Err(error) = self.applier.validate(&proposal.diff) {
            tracing::warn!(event_id = %event.id, %error, "diff rejected");
            self.finish(event, BuildOutcome::Rejected, Some(error.to_string()));
            return Ok(format!("BUILD REJECTED: {error}"));
        }

        let applied = self.applier.apply(&proposal.diff, &event.id);
        event.patch = Some(PatchMeta {
            path: applied.patch_file.clone(),
            backup: applied.backup_path.clone(),
            sha256: applied.sha256.as_ref().map(ToString::to_string),
            files: applied.modified_files.clone(),
        });
        if !applied.success {
            let outcome = applied.failure.map_or(BuildOutcome::Error, ErrorKind::outcome);
            self.finish(event, outcome, Some(applied.message.clone()));
            return Ok(format!("BUILD FAILED (patch apply): {}", applied.message));
        }

        let selection = self.runner.select(&proposal.test_commands);
        if let Some(rejected) = &selection.rejected {
            self.audit_substitution(rejected, &selection.command);
        }
        let run = match self.runner.run(&selection.command).await {
            Ok(run) => run,
            Err(error) => {
                tracing::warn!(event_id = %event.id, %error, "test command did not run");
                TestRun {
                    command: selection.command.clone(),
                    ok: false,
                    timed_out: false,
                    exit_code: None,
                    output: error.to_string(),
                }
            }
        };
        event.tests = Some(TestMeta {
            ran: true,
            cmd: run.command.clone(),
            ok: run.ok,
            timed_out: run.timed_out,
            exit_code: run.exit_code,
            output_tail: run.output.clone(),
        });

        if run.ok {
            self.finish(event, BuildOutcome::Ok, None);
            return Ok(format!(
                "BUILD OK: {}\nFiles modified: {}\nNotes: {}\nEvent: {}",
                event.verb,
                applied.modified_files.join(", "),
                proposal.notes,
                event.id
            ));
        }

        let mut error = format!("Tests failed: {}", tail_str(&run.output, ERROR_TAIL_BYTES));
        if let Some(backup) = &applied.backup_path {
            let reverted = self.applier.revert(backup);
            if !reverted.success {
                tracing::error!(event_id = %event.id, message = %reverted.message, "revert failed");
                error.push_str(&format!(" (revert failed: {})", reverted.message));
            }
        }
        self.finish(event, BuildOutcome::Failed, Some(error));
        Ok(format!(
            "BUILD FAILED (tests): Reverted changes.\nTest output: {}\nEvent: {}",
            tail_str(&run.output, REPLY_TAIL_BYTES),
            event.id
        ))
    }

    /// Governed direct mutation of the running world.
    ///
    /// Same gate as a build: kill switch first, then the consented cycle,
    /// which is spent before the world is touched.
    pub fn execute_world_mutation(
        &self,
        actor: &ActorId,
        mutation: &WorldMutation,
        world: &dyn WorldMutator,
    ) -> String {
        let mode = self.governance.mode();
        let mut event = BuildEvent::new(actor, mutation.verb(), mutation.args(), self.now());

        if mode.kill_switch() {
            tracing::warn!(actor = %actor, verb = mutation.verb(), "world mutation blocked by kill switch");
            event.mode = "IDLE".to_string();
            self.finish(&mut event, BuildOutcome::Blocked, Some(KILL_SWITCH_MESSAGE.to_string()));
            return KILL_SWITCH_MESSAGE.to_string();
        }

        if let Err(status) = mode.try_begin_build(actor) {
            return blocked_message(&status);
        }
        self.record(&event);

        match world::apply(world, mutation) {
            Ok(message) => {
                tracing::info!(actor = %actor, event_id = %event.id, verb = mutation.verb(), "world mutated");
                self.finish(&mut event, BuildOutcome::Ok, None);
                message
            }
            Err(error) => {
                tracing::warn!(actor = %actor, event_id = %event.id, %error, "world mutation failed");
                self.finish(&mut event, BuildOutcome::Failed, Some(error.to_string()));
                format!("BUILD FAILED: {error}")
            }
        }
    }

    /// Last `n` entries of the build log
    ///
    /// # Errors
    /// I/O failure reading the log
    pub fn get_event_log_tail(&self, n: usize) -> Result<Vec<Value>, EvidenceError> {
        self.governance.build_log().tail(n)
    }

    /// `[timestamp] id verb -> result` lines for display
    #[must_use]
    pub fn format_event_tail(&self, n: usize) -> String {
        let entries = match self.get_event_log_tail(n) {
            Ok(entries) => entries,
            Err(error) => return format!("Build log unreadable: {error}"),
        };
        if entries.is_empty() {
            return "No build events yet.".to_string();
        }
        let field = |entry: &Value, keys: &[&str]| {
            keys.iter()
                .find_map(|key| entry.get(*key).and_then(Value::as_str))
                .unwrap_or("?")
                .to_string()
        };
        let mut out = String::from("Recent build events:");
        for entry in &entries {
            out.push_str(&format!(
                "\n  [{}] {} {} -> {}",
                field(entry, &["timestamp"]),
                field(entry, &["id"]),
                field(entry, &["verb", "action", "event"]),
                field(entry, &["result"]),
            ));
        }
        out
    }

    fn audit_substitution(&self, rejected: &str, fallback: &str) {
        tracing::warn!(%rejected, %fallback, "test command outside allowlist replaced");
        self.governance.build_log().append(json!({
            "id": EventId::with_prefix("audit").to_string(),
            "event": "audit",
            "actor": "system",
            "mode": "AUDIT",
            "verb": "test_cmd_rejected",
            "args": { "rejected": rejected, "fallback": fallback },
            "result": "logged",
        }));
    }

    fn finish(&self, event: &mut BuildEvent, outcome: BuildOutcome, error: Option<String>) {
        event.result = outcome;
        event.error = error;
        tracing::info!(actor = %event.actor, event_id = %event.id, result = outcome.as_str(), "build finished");
        self.record(event);
    }

    fn record(&self, event: &BuildEvent) {
        self.governance.build_log().append(event.to_value());
    }

    fn now(&self) -> String {
        self.governance
            .clock()
            .now()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

fn blocked_message(status: &str) -> String {
    format!("BUILD BLOCKED: {status}\nUse /build on -> /consent yes first.")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
