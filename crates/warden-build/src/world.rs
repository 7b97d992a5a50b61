//! Direct world mutations that bypass the patch pipeline but not governance

use crate::error::BuildError;
use serde_json::{json, Map, Value};

/// A governed direct change to the running world
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldMutation {
    CreateRoom { direction: String, name: String },
    SpawnNpc { name: String },
}

impl WorldMutation {
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "create",
            Self::SpawnNpc { .. } => "spawn",
        }
    }

    /// Arguments as recorded on the build event
    #[must_use]
    pub fn args(&self) -> Map<String, Value> {
        let value = match self {
            Self::CreateRoom { direction, name } => json!({ "direction": direction, "name": name }),
            Self::SpawnNpc { name } => json!({ "name": name }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Parse `create <direction> <room name>` or `spawn <npc name>`
    ///
    /// # Errors
    /// The usage line for the verb when arguments are missing
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        match verb.to_lowercase().as_str() {
            "create" => {
                let (direction, name) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let name = name.trim();
                if direction.is_empty() || name.is_empty() {
                    return Err("Usage: create <direction> <room name>".to_string());
                }
                Ok(Some(Self::CreateRoom {
                    direction: direction.to_lowercase(),
                    name: name.to_string(),
                }))
            }
            "spawn" if rest.is_empty() => Err("Usage: spawn <npc name>".to_string()),
            "spawn" => Ok(Some(Self::SpawnNpc {
                name: rest.to_string(),
            })),
            _ => Ok(None),
        }
    }
}

/// Capability the host world exposes to the orchestrator
pub trait WorldMutator: Send + Sync {
    /// Create a room reached from the actor's location via `direction`
    ///
    /// # Errors
    /// [`BuildError::World`] when the world refuses the change
    fn create_room(&self, direction: &str, name: &str) -> Result<String, BuildError>;

    /// Spawn an NPC next to the actor
    ///
    /// # Errors
    /// [`BuildError::World`] when the world refuses the change
    fn spawn_npc(&self, name: &str) -> Result<String, BuildError>;
}

/// Dispatch `mutation` onto `world`
pub(crate) fn apply(world: &dyn WorldMutator, mutation: &WorldMutation) -> Result<String, BuildError> {
    match mutation {
        WorldMutation::CreateRoom { direction, name } => world.create_room(direction, name),
        WorldMutation::SpawnNpc { name } => world.spawn_npc(name),
    }
}
