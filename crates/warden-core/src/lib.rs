//! Warden Core
//!
//! Vocabulary shared by every Warden crate:
//! - Actor identity and role ([`ActorId`], [`Role`], [`Actor`])
//! - Event identifiers and terminal outcomes ([`EventId`], [`BuildOutcome`])
//! - Per-actor governance mode ([`Mode`])
//! - An injectable time source ([`Clock`])
//! - The configuration surface ([`WardenConfig`])
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::{Actor, Role, WardenConfig};
//!
//! let config = WardenConfig::load(Some("warden.toml".as_ref()))?;
//! let alice = Actor::new("Alice", Role::Human);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod clock;
mod config;
mod error;
mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    AuditConfig, ContextConfig, EvidenceConfig, GovernanceConfig, PatchConfig, RateLimitConfig,
    TestConfig, WardenConfig, MAX_WINDOW_SECS,
};
pub use error::ConfigError;
pub use types::{Actor, ActorId, BuildOutcome, ErrorKind, EventId, Mode, Role};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Byte-safe tail of a string: the last `max_bytes` bytes, moved forward to a char boundary.
#[must_use]
pub fn tail_str(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
