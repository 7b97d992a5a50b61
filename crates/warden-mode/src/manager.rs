//! Mode-state governance across all actors

use crate::state::ActorState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use warden_core::{ActorId, EventId, GovernanceConfig, Mode, SharedClock};
use warden_evidence::EvidenceLog;

pub(crate) const KILL_SWITCH_REFUSAL: &str = "Kill switch active: builds disabled.";
pub(crate) const NOTHING_ARMED: &str = "Nothing armed. Use /build on first.";

/// Result of one attempted transition, before it is rendered for the actor
enum Step {
    Done(String),
    Refused(String),
}

/// Owns every actor's [`ActorState`].
///
/// Actor states are created lazily on first access; the map tolerates
/// concurrent first access while each actor's state sits behind its own lock.
/// Illegal transitions return a refusal message rather than an error.
#[derive(Debug)]
pub struct ModeStateManager {
    states: DashMap<ActorId, Arc<Mutex<ActorState>>>,
    governance: GovernanceConfig,
    clock: SharedClock,
    log: Arc<EvidenceLog>,
}

impl ModeStateManager {
    #[must_use]
    pub fn new(governance: GovernanceConfig, log: Arc<EvidenceLog>, clock: SharedClock) -> Self {
        Self {
            states: DashMap::new(),
            governance,
            clock,
            log,
        }
    }

    #[inline]
    #[must_use]
    pub fn kill_switch(&self) -> bool {
        self.governance.kill_switch
    }

    #[inline]
    #[must_use]
    pub fn evidence(&self) -> &Arc<EvidenceLog> {
        &self.log
    }

    /// Snapshot of an actor's state, creating it if needed
    #[must_use]
    pub fn state(&self, actor: &ActorId) -> ActorState {
        self.slot(actor).lock().clone()
    }

    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.states.len()
    }

    /// Record intent text; allowed in any mode
    pub fn set_plan(&self, actor: &ActorId, text: &str) -> String {
        self.apply(actor, "plan", |state, _| {
            state.last_plan_text = Some(text.to_string());
            Step::Done(format!("Plan logged: {text}"))
        })
    }

    /// PLAN to BUILD
    pub fn enter_build_mode(&self, actor: &ActorId) -> String {
        let kill_switch = self.kill_switch();
        self.apply(actor, "enter_build", |state, _| {
            if kill_switch {
                return Step::Refused(KILL_SWITCH_REFUSAL.to_string());
            }
            if state.mode == Mode::Build {
                return Step::Refused("Already in BUILD mode.".to_string());
            }
            state.mode = Mode::Build;
            Step::Done("BUILD mode active. Use /build on to arm an operation.".to_string())
        })
    }

    /// Force PLAN and drop any arm or consent
    pub fn enter_plan_mode(&self, actor: &ActorId) -> String {
        self.apply(actor, "enter_plan", |state, _| {
            state.reset();
            Step::Done("PLAN mode active.".to_string())
        })
    }

    /// Open a time-boxed window for one build; clears any earlier consent
    pub fn arm(&self, actor: &ActorId) -> String {
        let kill_switch = self.kill_switch();
        self.apply(actor, "arm", |state, now| {
            if kill_switch {
                return Step::Refused(KILL_SWITCH_REFUSAL.to_string());
            }
            if state.mode != Mode::Build {
                return Step::Refused(
                    "Must be in BUILD mode to arm. Use /build on first.".to_string(),
                );
            }
            state.arm(now);
            Step::Done("Armed for one build operation. Use /consent yes to confirm.".to_string())
        })
    }

    /// `yes` confirms the armed operation, `no` withdraws arm and consent
    pub fn consent(&self, actor: &ActorId, yes: bool) -> String {
        let kill_switch = self.kill_switch();
        let action = if yes { "consent_yes" } else { "consent_no" };
        self.apply(actor, action, |state, _| {
            if yes && kill_switch {
                return Step::Refused(KILL_SWITCH_REFUSAL.to_string());
            }
            if !state.armed {
                return Step::Refused(NOTHING_ARMED.to_string());
            }
            if yes {
                state.consented = true;
                Step::Done("Consent given. Ready to build.".to_string())
            } else {
                state.clear_arm();
                Step::Done("Consent withdrawn. Disarmed.".to_string())
            }
        })
    }

    /// Cancel a pending arm
    pub fn disarm(&self, actor: &ActorId) -> String {
        self.apply(actor, "disarm", |state, _| {
            if !state.armed {
                return Step::Refused(NOTHING_ARMED.to_string());
            }
            state.clear_arm();
            Step::Done("Build disarmed.".to_string())
        })
    }

    /// Whether the actor may build right now.
    ///
    /// An expired arm window is cleared as a side effect, so a stale consent
    /// can never authorize a later action.
    pub fn can_build(&self, actor: &ActorId) -> bool {
        let slot = self.slot(actor);
        let mut state = slot.lock();
        let was_armed = state.armed;
        let allowed = state.can_build(self.clock.now(), self.governance.arm_timeout());
        if was_armed && !state.armed {
            let snapshot = state.clone();
            drop(state);
            tracing::info!(actor = %actor, "arm window expired");
            self.record(actor, "arm_expired", "ok", "Arm window expired.", &snapshot);
        }
        allowed
    }

    /// Check the gate and spend the cycle under one lock.
    ///
    /// The actor is reset to PLAN whether or not the gate passed, so
    /// concurrent callers can never share one consent. On refusal the error
    /// carries the status line as it stood at the check.
    ///
    /// # Errors
    /// The actor was not in BUILD, armed and consented inside the window.
    pub fn try_begin_build(&self, actor: &ActorId) -> Result<(), String> {
        let slot = self.slot(actor);
        let (allowed, expired, status, snapshot) = {
            let mut state = slot.lock();
            let was_armed = state.armed;
            let allowed = state.can_build(self.clock.now(), self.governance.arm_timeout());
            let expired = was_armed && !state.armed;
            let status = state.status();
            state.reset();
            (allowed, expired, status, state.clone())
        };
        if expired {
            tracing::info!(actor = %actor, "arm window expired");
            self.record(actor, "arm_expired", "ok", "Arm window expired.", &snapshot);
        }
        let message = if allowed {
            "Build cycle consumed."
        } else {
            "Build cycle consumed without a live consent."
        };
        tracing::debug!(actor = %actor, allowed, "build cycle consumed");
        self.record(actor, "consume_build_cycle", "ok", message, &snapshot);
        if allowed {
            Ok(())
        } else {
            Err(status)
        }
    }

    /// Snap back to PLAN, unarmed, unconsented.
    ///
    /// Builds spend their cycle through [`Self::try_begin_build`]; this is
    /// the unconditional form.
    pub fn consume_build_cycle(&self, actor: &ActorId) {
        self.apply(actor, "consume_build_cycle", |state, _| {
            state.reset();
            Step::Done("Build cycle consumed.".to_string())
        });
    }

    #[must_use]
    pub fn status(&self, actor: &ActorId) -> String {
        self.state(actor).status()
    }

    /// Interpret mode commands; `None` for anything else.
    ///
    /// `/plan <text>`, `/build on`, `/build off`, `/consent yes|no`, `dev status`
    pub fn process_command(&self, actor: &ActorId, line: &str) -> Option<String> {
        let line = line.trim();
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (line, ""),
        };
        let cmd = cmd.to_lowercase();
        let arg_lower = arg.to_lowercase();

        match cmd.as_str() {
            "/plan" if arg.is_empty() => Some("Usage: /plan <text>".to_string()),
            "/plan" => Some(self.set_plan(actor, arg)),
            "/build" => Some(match arg_lower.as_str() {
                "on" => self.build_on(actor),
                "off" => self.disarm(actor),
                _ => "Usage: /build on | /build off".to_string(),
            }),
            "/consent" => Some(match arg_lower.as_str() {
                "yes" => self.consent(actor, true),
                "no" => self.consent(actor, false),
                _ => "Usage: /consent yes | /consent no".to_string(),
            }),
            "dev" if arg_lower.starts_with("status") => Some(self.status(actor)),
            _ => None,
        }
    }

    fn build_on(&self, actor: &ActorId) -> String {
        if self.state(actor).mode == Mode::Build {
            return self.arm(actor);
        }
        let entered = self.enter_build_mode(actor);
        if self.state(actor).mode != Mode::Build {
            return entered;
        }
        format!("{entered}\n{}", self.arm(actor))
    }

    fn slot(&self, actor: &ActorId) -> Arc<Mutex<ActorState>> {
        self.states
            .entry(actor.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ActorState::new(actor.clone()))))
            .clone()
    }

    fn apply<F>(&self, actor: &ActorId, action: &str, f: F) -> String
    where
        F: FnOnce(&mut ActorState, DateTime<Utc>) -> Step,
    {
        let slot = self.slot(actor);
        let (step, snapshot) = {
            let mut state = slot.lock();
            let step = f(&mut *state, self.clock.now());
            (step, state.clone())
        };
        match step {
            Step::Done(message) => {
                tracing::debug!(actor = %actor, action, mode = %snapshot.mode, "mode transition");
                self.record(actor, action, "ok", &message, &snapshot);
                message
            }
            Step::Refused(message) => {
                tracing::info!(actor = %actor, action, reason = %message, "mode transition refused");
                self.record(actor, action, "refused", &message, &snapshot);
                message
            }
        }
    }

    fn record(&self, actor: &ActorId, action: &str, result: &str, message: &str, state: &ActorState) {
        self.log.append(json!({
            "id": EventId::with_prefix("mode").to_string(),
            "event": "mode_transition",
            "actor": actor.as_str(),
            "action": action,
            "result": result,
            "message": message,
            "state": {
                "mode": state.mode,
                "armed": state.armed,
                "consented": state.consented,
            },
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ManualClock;

    struct Fixture {
        _dir: tempfile::TempDir,
        clock: Arc<ManualClock>,
        manager: ModeStateManager,
    }

    fn fixture(governance: GovernanceConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(EvidenceLog::new(dir.path().join("event_log.jsonl"), u64::MAX));
        let clock = Arc::new(ManualClock::starting_now());
        let manager = ModeStateManager::new(governance, log, clock.clone());
        Fixture {
            _dir: dir,
            clock,
            manager,
        }
    }

    fn alice() -> ActorId {
        ActorId::new("Alice")
    }

    fn ready(manager: &ModeStateManager, actor: &ActorId) {
        manager.enter_build_mode(actor);
        manager.arm(actor);
        manager.consent(actor, true);
    }

    #[test]
    fn cannot_build_initially() {
        let fx = fixture(GovernanceConfig::default());
        assert!(!fx.manager.can_build(&alice()));
        assert!(fx.manager.state(&alice()).is_idle());
    }

    #[test]
    fn happy_path_enables_build() {
        let fx = fixture(GovernanceConfig::default());
        let m = &fx.manager;
        assert_eq!(
            m.enter_build_mode(&alice()),
            "BUILD mode active. Use /build on to arm an operation."
        );
        assert!(!m.can_build(&alice()));
        assert_eq!(
            m.arm(&alice()),
            "Armed for one build operation. Use /consent yes to confirm."
        );
        assert!(!m.can_build(&alice()));
        assert_eq!(m.consent(&alice(), true), "Consent given. Ready to build.");
        assert!(m.can_build(&alice()));
    }

    #[test]
    fn out_of_order_steps_refused() {
        let fx = fixture(GovernanceConfig::default());
        let m = &fx.manager;
        assert_eq!(m.consent(&alice(), true), NOTHING_ARMED);
        assert_eq!(
            m.arm(&alice()),
            "Must be in BUILD mode to arm. Use /build on first."
        );
        m.enter_build_mode(&alice());
        assert_eq!(m.consent(&alice(), true), NOTHING_ARMED);
        assert_eq!(m.enter_build_mode(&alice()), "Already in BUILD mode.");
        assert!(!m.can_build(&alice()));
    }

    #[test]
    fn rearm_clears_stale_consent() {
        let fx = fixture(GovernanceConfig::default());
        ready(&fx.manager, &alice());
        fx.manager.arm(&alice());
        assert!(!fx.manager.can_build(&alice()));
    }

    #[test]
    fn consent_no_disarms() {
        let fx = fixture(GovernanceConfig::default());
        let m = &fx.manager;
        m.enter_build_mode(&alice());
        m.arm(&alice());
        assert_eq!(m.consent(&alice(), false), "Consent withdrawn. Disarmed.");
        let state = m.state(&alice());
        assert!(!state.armed && !state.consented);
    }

    #[test]
    fn arm_window_boundary() {
        let fx = fixture(GovernanceConfig::default());
        ready(&fx.manager, &alice());
        fx.clock.advance_secs(299);
        assert!(fx.manager.can_build(&alice()));
        fx.clock.advance_secs(2);
        assert!(!fx.manager.can_build(&alice()));
        let state = fx.manager.state(&alice());
        assert!(!state.armed);
        assert!(!state.consented);
        // Stays false even if the clock were wound back.
        fx.clock.advance_secs(-301);
        assert!(!fx.manager.can_build(&alice()));
    }

    #[test]
    fn consume_resets_to_plan() {
        let fx = fixture(GovernanceConfig::default());
        ready(&fx.manager, &alice());
        fx.manager.consume_build_cycle(&alice());
        assert!(fx.manager.state(&alice()).is_idle());
        assert!(!fx.manager.can_build(&alice()));
    }

    #[test]
    fn begin_build_spends_consent_once() {
        let fx = fixture(GovernanceConfig::default());
        ready(&fx.manager, &alice());
        assert_eq!(fx.manager.try_begin_build(&alice()), Ok(()));
        assert!(fx.manager.state(&alice()).is_idle());
        assert_eq!(
            fx.manager.try_begin_build(&alice()),
            Err("Mode: PLAN | Armed: false | Consented: false".to_string())
        );
    }

    #[test]
    fn begin_build_after_expiry_is_refused_and_reset() {
        let fx = fixture(GovernanceConfig::default());
        ready(&fx.manager, &alice());
        fx.clock.advance_secs(301);
        assert_eq!(
            fx.manager.try_begin_build(&alice()),
            Err("Mode: BUILD | Armed: false | Consented: false".to_string())
        );
        assert!(fx.manager.state(&alice()).is_idle());
        let actions: Vec<_> = fx
            .manager
            .evidence()
            .tail(2)
            .unwrap()
            .iter()
            .map(|e| e["action"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(actions, vec!["arm_expired", "consume_build_cycle"]);
    }

    #[test]
    fn concurrent_begin_build_admits_one() {
        let fx = fixture(GovernanceConfig::default());
        ready(&fx.manager, &alice());
        let manager = Arc::new(fx.manager);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.try_begin_build(&alice()).is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn kill_switch_blocks_entry_arm_and_consent() {
        let fx = fixture(GovernanceConfig {
            kill_switch: true,
            ..GovernanceConfig::default()
        });
        let m = &fx.manager;
        assert_eq!(m.enter_build_mode(&alice()), KILL_SWITCH_REFUSAL);
        assert_eq!(m.arm(&alice()), KILL_SWITCH_REFUSAL);
        assert_eq!(m.consent(&alice(), true), KILL_SWITCH_REFUSAL);
        assert_eq!(m.state(&alice()).mode, Mode::Plan);
    }

    #[test]
    fn actors_are_isolated() {
        let fx = fixture(GovernanceConfig::default());
        let bob = ActorId::new("Bob");
        ready(&fx.manager, &alice());
        assert!(fx.manager.can_build(&alice()));
        assert!(!fx.manager.can_build(&bob));
        fx.manager.consume_build_cycle(&bob);
        assert!(fx.manager.can_build(&alice()));
    }

    #[test]
    fn process_command_flow() {
        let fx = fixture(GovernanceConfig::default());
        let m = &fx.manager;
        assert_eq!(
            m.process_command(&alice(), "/plan add a cabin").as_deref(),
            Some("Plan logged: add a cabin")
        );
        assert_eq!(
            m.state(&alice()).last_plan_text.as_deref(),
            Some("add a cabin")
        );
        let on = m.process_command(&alice(), "/build on").unwrap();
        assert!(on.starts_with("BUILD mode active."));
        assert!(on.ends_with("Use /consent yes to confirm."));
        assert_eq!(
            m.process_command(&alice(), "/CONSENT Yes").as_deref(),
            Some("Consent given. Ready to build.")
        );
        assert_eq!(
            m.process_command(&alice(), "dev status").as_deref(),
            Some("Mode: BUILD | Armed: true | Consented: true")
        );
        assert_eq!(
            m.process_command(&alice(), "/build off").as_deref(),
            Some("Build disarmed.")
        );
        assert_eq!(m.process_command(&alice(), "look north"), None);
        assert_eq!(m.process_command(&alice(), ""), None);
        assert_eq!(
            m.process_command(&alice(), "/build maybe").as_deref(),
            Some("Usage: /build on | /build off")
        );
    }

    #[test]
    fn build_on_in_build_mode_only_arms() {
        let fx = fixture(GovernanceConfig::default());
        fx.manager.enter_build_mode(&alice());
        assert_eq!(
            fx.manager.process_command(&alice(), "/build on").as_deref(),
            Some("Armed for one build operation. Use /consent yes to confirm.")
        );
    }

    #[test]
    fn transitions_and_refusals_are_logged() {
        let fx = fixture(GovernanceConfig::default());
        fx.manager.arm(&alice());
        fx.manager.enter_build_mode(&alice());
        let entries = fx.manager.evidence().read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["action"], "arm");
        assert_eq!(entries[0]["result"], "refused");
        assert_eq!(entries[1]["action"], "enter_build");
        assert_eq!(entries[1]["result"], "ok");
        assert_eq!(entries[1]["state"]["mode"], "BUILD");
    }

    #[test]
    fn expiry_is_logged() {
        let fx = fixture(GovernanceConfig::default());
        ready(&fx.manager, &alice());
        fx.clock.advance_secs(1000);
        fx.manager.can_build(&alice());
        let last = fx.manager.evidence().tail(1).unwrap();
        assert_eq!(last[0]["action"], "arm_expired");
    }

    #[test]
    fn concurrent_first_access_creates_one_state() {
        let fx = fixture(GovernanceConfig::default());
        let manager = Arc::new(fx.manager);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.state(&ActorId::new("shared")))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(manager.actor_count(), 1);
    }
}
