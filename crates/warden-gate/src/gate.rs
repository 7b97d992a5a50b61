//! Role-based permission gate
//!
//! Decides which actor class may even request a capability. Whether the actor
//! is currently armed is a separate question answered by the mode manager.

use crate::audit::{AuditLogger, AuditResult};
use crate::rate::RateLimiter;
use std::sync::Arc;
use warden_core::{Actor, GovernanceConfig, RateLimitConfig, Role, SharedClock, SystemClock};

/// Top-level verbs automated actors may never issue
pub const DENIED_AUTOMATED_VERBS: &[&str] = &["/build", "/consent", "create", "spawn", "bruce"];

/// Verb + subcommand pairs automated actors may never issue
pub const DENIED_AUTOMATED_PAIRS: &[&str] = &["dev buildstub"];

/// Gate verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub result: AuditResult,
    pub reason: String,
}

impl Decision {
    #[must_use]
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            result: AuditResult::Allowed,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            result: AuditResult::Denied,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Self {
            result: AuditResult::RateLimited,
            reason: reason.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.result == AuditResult::Allowed
    }
}

/// Single choke point run before any command is interpreted
#[derive(Debug)]
pub struct PermissionGate {
    audit: AuditLogger,
    limiter: RateLimiter,
    governance: GovernanceConfig,
}

impl PermissionGate {
    #[must_use]
    pub fn new(audit: AuditLogger, limiter: RateLimiter, governance: GovernanceConfig) -> Self {
        Self {
            audit,
            limiter,
            governance,
        }
    }

    /// Gate with a system-clock rate limiter built from config
    #[must_use]
    pub fn from_config(
        audit: AuditLogger,
        rate_limit: &RateLimitConfig,
        governance: GovernanceConfig,
    ) -> Self {
        Self::new(
            audit,
            RateLimiter::from_config(rate_limit, Arc::new(SystemClock)),
            governance,
        )
    }

    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.limiter.replace_clock(clock);
        self
    }

    #[inline]
    #[must_use]
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Decide and audit one command.
    ///
    /// Humans and NPCs always pass. Automated actors are denied the fixed
    /// verb set, matched case-insensitively on the first one or two tokens.
    pub fn authorize(&self, actor: &Actor, cmd_text: &str) -> Decision {
        let decision = classify(actor.role, cmd_text);
        self.audit
            .record(actor, cmd_text, decision.result, &decision.reason);
        if !decision.is_allowed() {
            tracing::info!(actor = %actor.id, reason = %decision.reason, "command denied");
        }
        decision
    }

    /// Full per-message front door: size cap, rate limit, then [`authorize`](Self::authorize)
    pub fn admit(&self, actor: &Actor, raw_message: &str) -> Decision {
        if let Err(e) = self.audit.validate_message(raw_message) {
            let decision = Decision::deny(e.to_string());
            self.audit
                .record(actor, raw_message, decision.result, &decision.reason);
            tracing::warn!(actor = %actor.id, reason = %decision.reason, "message rejected");
            return decision;
        }

        if actor.role.is_automated() && !self.limiter.check(&actor.id) {
            let decision = Decision::rate_limited(self.limiter.limit_reason());
            self.audit
                .record(actor, raw_message, decision.result, &decision.reason);
            tracing::warn!(actor = %actor.id, "rate limited");
            return decision;
        }

        self.authorize(actor, raw_message)
    }

    /// Connection-time interlock for automated actors.
    ///
    /// Passes when the kill switch is on (no mutation window can be live) or
    /// when the explicit override is set. Non-automated actors always pass.
    pub fn check_interlock(&self, actor: &Actor) -> Decision {
        if !actor.role.is_automated() {
            return Decision::allow(actor.role.as_str());
        }
        let decision = if self.governance.kill_switch {
            Decision::allow("kill switch active, interlock passes")
        } else if self.governance.allow_automated_when_active {
            Decision::allow("builds active, explicit override set")
        } else {
            Decision::deny(
                "builds active, automated connections refused; set allow_automated_when_active to override",
            )
        };
        self.audit
            .record(actor, "<connect>", decision.result, &decision.reason);
        decision
    }
}

/// Pure role/verb classification shared by every caller
#[must_use]
pub fn classify(role: Role, cmd_text: &str) -> Decision {
    if !role.is_automated() {
        return Decision::allow(role.as_str());
    }

    let mut tokens = cmd_text.split_whitespace();
    let Some(first) = tokens.next() else {
        return Decision::allow("empty");
    };
    let verb = first.to_lowercase();
    if DENIED_AUTOMATED_VERBS.contains(&verb.as_str()) {
        return Decision::deny(format!("bot denied: {verb}"));
    }
    if let Some(second) = tokens.next() {
        let pair = format!("{verb} {}", second.to_lowercase());
        if DENIED_AUTOMATED_PAIRS.contains(&pair.as_str()) {
            return Decision::deny(format!("bot denied: {pair}"));
        }
    }
    Decision::allow("allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use warden_core::{AuditConfig, ManualClock};
    use warden_evidence::EvidenceLog;

    fn gate(dir: &tempfile::TempDir, governance: GovernanceConfig) -> PermissionGate {
        let log = Arc::new(EvidenceLog::new(dir.path().join("audit.jsonl"), u64::MAX));
        PermissionGate::from_config(
            AuditLogger::new(log, AuditConfig::default()),
            &RateLimitConfig::default(),
            governance,
        )
    }

    #[test]
    fn denies_verbs_for_automated() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir, GovernanceConfig::default());
        let bot = Actor::automated("bot");
        for cmd in [
            "/build on",
            "/BUILD",
            "/consent yes",
            "create room north Cabin",
            "Spawn wolf",
            "bruce follow",
            "dev buildstub",
            "DEV BuildStub now",
            "  create  ",
        ] {
            let decision = gate.authorize(&bot, cmd);
            assert!(!decision.is_allowed(), "{cmd} should be denied");
            assert!(decision.reason.starts_with("bot denied: "));
        }
    }

    #[test]
    fn allows_same_verbs_for_humans_and_npcs() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir, GovernanceConfig::default());
        for actor in [Actor::human("Alice"), Actor::new("Bruce", Role::Npc)] {
            for cmd in ["/build on", "/consent yes", "create room", "spawn x", "dev buildstub"] {
                let decision = gate.authorize(&actor, cmd);
                assert!(decision.is_allowed());
                assert_eq!(decision.reason, actor.role.as_str());
            }
        }
    }

    #[test]
    fn allows_ordinary_commands_for_automated() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir, GovernanceConfig::default());
        let bot = Actor::automated("bot");
        for cmd in ["look", "north", "say /build is cool", "dev status", "/plan a cabin", "creates"] {
            assert!(gate.authorize(&bot, cmd).is_allowed(), "{cmd}");
        }
        assert_eq!(gate.authorize(&bot, "   ").reason, "empty");
    }

    #[test]
    fn every_decision_is_audited() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir, GovernanceConfig::default());
        gate.authorize(&Actor::automated("bot"), "look");
        gate.authorize(&Actor::automated("bot"), "spawn");
        gate.authorize(&Actor::human("Alice"), "spawn");
        let entries = gate.audit().log().read_all().unwrap();
        let results: Vec<_> = entries.iter().map(|e| e["result"].as_str().unwrap()).collect();
        assert_eq!(results, vec!["allowed", "denied", "allowed"]);
    }

    #[test]
    fn admit_rejects_oversized_message() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir, GovernanceConfig::default());
        let decision = gate.admit(&Actor::human("Alice"), &"x".repeat(5000));
        assert_eq!(decision.result, AuditResult::Denied);
        let entries = gate.audit().log().read_all().unwrap();
        assert_eq!(entries[0]["truncated"], true);
        assert_eq!(entries[0]["original_chars"], 5000);
    }

    #[test]
    fn admit_rate_limits_automated_only() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let gate = gate(&dir, GovernanceConfig::default()).with_clock(clock.clone());
        let bot = Actor::automated("bot");
        for _ in 0..5 {
            assert!(gate.admit(&bot, "look").is_allowed());
        }
        assert_eq!(gate.admit(&bot, "look").result, AuditResult::RateLimited);
        for _ in 0..20 {
            assert!(gate.admit(&Actor::human("Alice"), "look").is_allowed());
        }
        clock.advance_secs(11);
        assert!(gate.admit(&bot, "look").is_allowed());
    }

    #[test]
    fn admit_still_authorizes() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir, GovernanceConfig::default());
        assert_eq!(
            gate.admit(&Actor::automated("bot"), "/consent yes").result,
            AuditResult::Denied
        );
    }

    #[test]
    fn interlock_refuses_automated_while_active() {
        let dir = tempfile::tempdir().unwrap();
        let bot = Actor::automated("bot");

        let active = gate(&dir, GovernanceConfig::default());
        assert!(!active.check_interlock(&bot).is_allowed());
        assert!(active.check_interlock(&Actor::human("Alice")).is_allowed());

        let killed = gate(
            &dir,
            GovernanceConfig {
                kill_switch: true,
                ..GovernanceConfig::default()
            },
        );
        assert!(killed.check_interlock(&bot).is_allowed());

        let overridden = gate(
            &dir,
            GovernanceConfig {
                allow_automated_when_active: true,
                ..GovernanceConfig::default()
            },
        );
        assert!(overridden.check_interlock(&bot).is_allowed());
    }

    proptest! {
        #[test]
        fn denied_verbs_denied_regardless_of_case_and_args(
            idx in 0..DENIED_AUTOMATED_VERBS.len(),
            upper in proptest::collection::vec(any::<bool>(), 16),
            args in "[a-z0-9 ]{0,20}",
        ) {
            let verb: String = DENIED_AUTOMATED_VERBS[idx]
                .chars()
                .zip(upper.iter().cycle())
                .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
                .collect();
            let cmd = format!("{verb} {args}");
            prop_assert!(!classify(Role::Automated, &cmd).is_allowed());
            prop_assert!(classify(Role::Human, &cmd).is_allowed());
            prop_assert!(classify(Role::Npc, &cmd).is_allowed());
        }
    }
}
