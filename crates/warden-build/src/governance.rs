//! The shared governance context
//!
//! Built once per process from [`WardenConfig`] and shared by reference.

use std::sync::Arc;
use warden_core::{Actor, SharedClock, SystemClock, WardenConfig};
use warden_evidence::EvidenceLog;
use warden_gate::{AuditLogger, PermissionGate, RateLimiter};
use warden_mode::ModeStateManager;

/// Mode state, permission gate and evidence logs behind one handle
#[derive(Debug)]
pub struct Governance {
    config: WardenConfig,
    clock: SharedClock,
    build_log: Arc<EvidenceLog>,
    audit_log: Arc<EvidenceLog>,
    mode: Arc<ModeStateManager>,
    gate: Arc<PermissionGate>,
}

impl Governance {
    /// Wire every component from `config`, reading time from `clock`
    #[must_use]
    pub fn new(config: WardenConfig, clock: SharedClock) -> Self {
        let build_log = Arc::new(EvidenceLog::from_config(
            config.evidence.build_log_path(),
            &config.evidence,
        ));
        let audit_log = Arc::new(EvidenceLog::from_config(
            config.evidence.audit_log_path(),
            &config.evidence,
        ));
        let mode = Arc::new(ModeStateManager::new(
            config.governance.clone(),
            Arc::clone(&build_log),
            Arc::clone(&clock),
        ));
        let gate = Arc::new(PermissionGate::new(
            AuditLogger::new(Arc::clone(&audit_log), config.audit.clone()),
            RateLimiter::from_config(&config.rate_limit, Arc::clone(&clock)),
            config.governance.clone(),
        ));
        tracing::info!(
            evidence = %config.evidence.dir.display(),
            kill_switch = config.governance.kill_switch,
            "governance initialised"
        );
        Self {
            config,
            clock,
            build_log,
            audit_log,
            mode,
            gate,
        }
    }

    /// [`new`](Self::new) on the system clock
    #[must_use]
    pub fn from_config(config: WardenConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    #[inline]
    #[must_use]
    pub fn build_log(&self) -> &Arc<EvidenceLog> {
        &self.build_log
    }

    #[inline]
    #[must_use]
    pub fn audit_log(&self) -> &Arc<EvidenceLog> {
        &self.audit_log
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> &Arc<ModeStateManager> {
        &self.mode
    }

    #[inline]
    #[must_use]
    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    /// Admit one raw command line, then interpret it if it is a mode command.
    ///
    /// `None` means the line was admitted but is not a mode command.
    pub fn handle_command(&self, actor: &Actor, line: &str) -> Option<String> {
        let decision = self.gate.admit(actor, line);
        if !decision.is_allowed() {
            return Some(format!("Command refused: {}", decision.reason));
        }
        self.mode.process_command(&actor.id, line)
    }
}
