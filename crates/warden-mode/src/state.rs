//! Per-actor governance state

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{ActorId, Mode};

/// Isolated build state for one actor
///
/// `can_build` holds only when mode is BUILD, the actor is armed and has
/// consented, and the arm window has not expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorState {
    pub actor: ActorId,
    pub mode: Mode,
    pub armed: bool,
    pub consented: bool,
    pub armed_at: Option<DateTime<Utc>>,
    pub last_plan_text: Option<String>,
}

impl ActorState {
    #[must_use]
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            mode: Mode::Plan,
            armed: false,
            consented: false,
            armed_at: None,
            last_plan_text: None,
        }
    }

    /// Full build check; an expired window clears arm and consent.
    pub fn can_build(&mut self, now: DateTime<Utc>, timeout: Duration) -> bool {
        if !(self.mode == Mode::Build && self.armed && self.consented) {
            return false;
        }
        if self.is_expired(now, timeout) {
            self.clear_arm();
            return false;
        }
        true
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.armed_at.is_some_and(|at| now - at > timeout)
    }

    pub(crate) fn arm(&mut self, now: DateTime<Utc>) {
        self.armed = true;
        self.consented = false;
        self.armed_at = Some(now);
    }

    pub(crate) fn clear_arm(&mut self) {
        self.armed = false;
        self.consented = false;
        self.armed_at = None;
    }

    /// Back to PLAN, unarmed, unconsented
    pub(crate) fn reset(&mut self) {
        self.mode = Mode::Plan;
        self.clear_arm();
    }

    #[must_use]
    pub fn status(&self) -> String {
        format!(
            "Mode: {} | Armed: {} | Consented: {}",
            self.mode, self.armed, self.consented
        )
    }

    /// True when mode, arm and consent are all at their resting values
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.mode == Mode::Plan && !self.armed && !self.consented
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(now: DateTime<Utc>) -> ActorState {
        let mut state = ActorState::new(ActorId::new("Alice"));
        state.mode = Mode::Build;
        state.arm(now);
        state.consented = true;
        state
    }

    #[test]
    fn fresh_state_is_idle() {
        let mut state = ActorState::new(ActorId::new("Alice"));
        assert!(state.is_idle());
        assert!(!state.can_build(Utc::now(), Duration::seconds(300)));
        assert_eq!(state.status(), "Mode: PLAN | Armed: false | Consented: false");
    }

    #[test]
    fn expiry_boundary() {
        let t0 = Utc::now();
        let timeout = Duration::seconds(300);
        let mut state = ready(t0);
        assert!(state.can_build(t0 + Duration::seconds(300), timeout));
        assert!(!state.can_build(t0 + Duration::seconds(301), timeout));
        assert!(!state.armed);
        assert!(!state.consented);
        assert_eq!(state.mode, Mode::Build);
    }

    #[test]
    fn reset_clears_everything_but_plan_text() {
        let mut state = ready(Utc::now());
        state.last_plan_text = Some("cabin".into());
        state.reset();
        assert!(state.is_idle());
        assert_eq!(state.armed_at, None);
        assert_eq!(state.last_plan_text.as_deref(), Some("cabin"));
    }
}
