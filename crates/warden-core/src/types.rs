//! Core identity and outcome types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Actor identifier (player name, bot name, NPC name)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ActorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Actor class. Decides which capabilities an actor may even request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Interactive human player
    Human,
    /// Server-driven non-player character
    Npc,
    /// Automated client (AI player, script, bot)
    #[serde(alias = "bot")]
    Automated,
}

impl Role {
    #[inline]
    #[must_use]
    pub fn is_automated(self) -> bool {
        matches!(self, Role::Automated)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Npc => "npc",
            Role::Automated => "automated",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Role::Human),
            "npc" => Ok(Role::Npc),
            "automated" | "bot" => Ok(Role::Automated),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An actor as seen by the permission gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<ActorId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    #[inline]
    #[must_use]
    pub fn human(id: impl Into<ActorId>) -> Self {
        Self::new(id, Role::Human)
    }

    #[inline]
    #[must_use]
    pub fn automated(id: impl Into<ActorId>) -> Self {
        Self::new(id, Role::Automated)
    }
}

/// Evidence-log event identifier, rendered `<prefix>_<12 hex>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Fresh build event id (`evt_...`)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix("evt")
    }

    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(format!("{prefix}_{}", &simple[..12]))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-actor governance mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// Observe and log intent only
    #[default]
    Plan,
    /// Eligible to mutate, pending arm + consent
    Build,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Plan => "PLAN",
            Mode::Build => "BUILD",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle result of a build event.
///
/// `Pending` is written at creation; every other variant is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    Pending,
    Ok,
    Failed,
    Error,
    Rejected,
    Blocked,
}

impl BuildOutcome {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, BuildOutcome::Pending)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BuildOutcome::Pending => "pending",
            BuildOutcome::Ok => "ok",
            BuildOutcome::Failed => "failed",
            BuildOutcome::Error => "error",
            BuildOutcome::Rejected => "rejected",
            BuildOutcome::Blocked => "blocked",
        }
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy shared by every error enum's `kind()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Untrusted input refused before any mutation
    Validation,
    /// Mutation attempted and rolled back
    Apply,
    /// Test run failed or timed out
    Test,
    /// Anything else
    Unexpected,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Apply => "apply",
            ErrorKind::Test => "test",
            ErrorKind::Unexpected => "unexpected",
        }
    }

    /// Build outcome recorded for a failure of this kind
    #[must_use]
    pub fn outcome(self) -> BuildOutcome {
        match self {
            ErrorKind::Validation => BuildOutcome::Rejected,
            ErrorKind::Test => BuildOutcome::Failed,
            ErrorKind::Apply | ErrorKind::Unexpected => BuildOutcome::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_has_prefix_and_twelve_hex() {
        let id = EventId::with_prefix("audit");
        let (prefix, hex) = id.as_str().split_once('_').unwrap();
        assert_eq!(prefix, "audit");
        assert_eq!(hex.len(), 12);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn event_ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn role_accepts_bot_alias() {
        let role: Role = serde_json::from_str("\"bot\"").unwrap();
        assert_eq!(role, Role::Automated);
        assert_eq!("BOT".parse::<Role>().unwrap(), Role::Automated);
        assert!("wizard".parse::<Role>().is_err());
    }

    #[test]
    fn outcome_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&BuildOutcome::Rejected).unwrap(), "\"rejected\"");
        assert!(!BuildOutcome::Pending.is_terminal());
        assert!(BuildOutcome::Blocked.is_terminal());
    }

    #[test]
    fn error_kind_maps_to_outcome() {
        assert_eq!(ErrorKind::Validation.outcome(), BuildOutcome::Rejected);
        assert_eq!(ErrorKind::Apply.outcome(), BuildOutcome::Error);
        assert_eq!(ErrorKind::Test.outcome(), BuildOutcome::Failed);
    }

    #[test]
    fn mode_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Mode::Build).unwrap(), "\"BUILD\"");
        assert_eq!(Mode::default(), Mode::Plan);
    }
}
