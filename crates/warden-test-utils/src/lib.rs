//! Testing utilities for the warden workspace
//!
//! Shared fixtures: throwaway repositories, stepped clocks, scripted patch
//! providers, a recording world and small diff builders.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;
use warden_build::{
    BuildError, BuildOrchestrator, Governance, PatchProposal, PatchProvider, PatchRequest, WorldMutator,
};
use warden_core::{ActorId, ManualClock, TestConfig, WardenConfig};

/// A temp directory holding a repository and an evidence directory
pub struct TestWorkspace {
    _dir: TempDir,
    pub repo: PathBuf,
    pub evidence: PathBuf,
    pub clock: Arc<ManualClock>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let evidence = dir.path().join("evidence");
        fs::create_dir_all(&repo).unwrap();
        Self {
            _dir: dir,
            repo,
            evidence,
            clock: Arc::new(ManualClock::starting_now()),
        }
    }

    /// Config pointing at this workspace, with `true`/`false` as the only tests
    pub fn config(&self) -> WardenConfig {
        WardenConfig::default()
            .with_evidence_dir(&self.evidence)
            .with_tests(shell_free_tests("true"))
    }

    pub fn governance(&self, config: WardenConfig) -> Arc<Governance> {
        Arc::new(Governance::new(config, self.clock.clone()))
    }

    pub fn orchestrator(&self, governance: Arc<Governance>, provider: Arc<dyn PatchProvider>) -> BuildOrchestrator {
        BuildOrchestrator::new(governance, self.repo.clone(), provider)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.repo.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.repo.join(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.repo.join(rel).exists()
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.evidence.join("patches")
    }

    /// Every file under the repository, relative and sorted
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = WalkDir::new(&self.repo)
            .into_iter()
            .map(Result::unwrap)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.repo)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        files
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Test config allowing only the `true` and `false` binaries
pub fn shell_free_tests(default_command: &str) -> TestConfig {
    TestConfig {
        allowlist: vec!["true".to_string(), "false".to_string()],
        default_command: default_command.to_string(),
        timeout_secs: 10,
        output_tail_bytes: 500,
    }
}

/// Walk `actor` through `/build on` and `/consent yes`
pub fn arm_and_consent(governance: &Governance, actor: &ActorId) {
    governance.mode().process_command(actor, "/build on").unwrap();
    governance.mode().process_command(actor, "/consent yes").unwrap();
    assert!(governance.mode().can_build(actor), "actor should be cleared to build");
}

pub fn proposal(diff: &str, tests: &[&str]) -> PatchProposal {
    PatchProposal {
        diff: diff.to_string(),
        notes: "scripted".to_string(),
        test_commands: tests.iter().map(ToString::to_string).collect(),
    }
}

/// Provider that replays queued answers and records every request
#[derive(Default)]
pub struct ScriptedProvider {
    answers: Mutex<VecDeque<Result<PatchProposal, String>>>,
    requests: Mutex<Vec<PatchRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(proposal: PatchProposal) -> Arc<Self> {
        let provider = Self::new();
        provider.push(proposal);
        Arc::new(provider)
    }

    pub fn push(&self, proposal: PatchProposal) {
        self.answers.lock().push_back(Ok(proposal));
    }

    pub fn push_failure(&self, message: &str) {
        self.answers.lock().push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<PatchRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl PatchProvider for ScriptedProvider {
    async fn propose(&self, request: &PatchRequest) -> Result<PatchProposal, BuildError> {
        self.requests.lock().push(request.clone());
        match self.answers.lock().pop_front() {
            Some(Ok(proposal)) => Ok(proposal),
            Some(Err(message)) => Err(BuildError::Provider(message)),
            None => Err(BuildError::Provider("no scripted answer left".to_string())),
        }
    }
}

/// One call seen by [`RecordingWorld`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldCall {
    CreateRoom { direction: String, name: String },
    SpawnNpc { name: String },
}

/// World double that records calls and optionally refuses them
#[derive(Debug, Default)]
pub struct RecordingWorld {
    calls: Mutex<Vec<WorldCall>>,
    refuse: bool,
}

impl RecordingWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            calls: Mutex::default(),
            refuse: true,
        }
    }

    pub fn calls(&self) -> Vec<WorldCall> {
        self.calls.lock().clone()
    }

    fn answer(&self, call: WorldCall, ok: String) -> Result<String, BuildError> {
        self.calls.lock().push(call);
        if self.refuse {
            Err(BuildError::World("world refused".to_string()))
        } else {
            Ok(ok)
        }
    }
}

impl WorldMutator for RecordingWorld {
    fn create_room(&self, direction: &str, name: &str) -> Result<String, BuildError> {
        self.answer(
            WorldCall::CreateRoom {
                direction: direction.to_string(),
                name: name.to_string(),
            },
            format!("Created {name} to the {direction}."),
        )
    }

    fn spawn_npc(&self, name: &str) -> Result<String, BuildError> {
        self.answer(
            WorldCall::SpawnNpc {
                name: name.to_string(),
            },
            format!("{name} appears."),
        )
    }
}

/// Diff creating `path` with `lines`
pub fn new_file_diff(path: &str, lines: &[&str]) -> String {
    let mut diff = format!("--- /dev/null\n+++ b/{path}\n@@ -0,0 +1,{} @@\n", lines.len());
    for line in lines {
        diff.push('+');
        diff.push_str(line);
        diff.push('\n');
    }
    diff
}

/// Diff replacing line `line_no` (1-based) of `path`, `old` becoming `new`
pub fn replace_line_diff(path: &str, line_no: usize, old: &str, new: &str) -> String {
    format!("--- a/{path}\n+++ b/{path}\n@@ -{line_no} +{line_no} @@\n-{old}\n+{new}\n")
}

/// Diff that tries to write outside the repository
pub fn traversal_diff() -> String {
    "--- a/../../etc/passwd\n+++ b/../../etc/passwd\n@@ -1 +1 @@\n-root\n+owned\n".to_string()
}
