//! Warden Gate
//!
//! Front door for every command an actor sends:
//! - [`PermissionGate::admit`] caps raw message size, throttles automated
//!   actors through a [`RateLimiter`], then calls [`PermissionGate::authorize`].
//! - [`PermissionGate::authorize`] is the one role/verb choke point; tests and
//!   production share it.
//! - [`PermissionGate::check_interlock`] refuses automated connections while a
//!   mutation window may be live.
//!
//! Every decision, allowed or not, lands in the evidence log through the
//! [`AuditLogger`].

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod audit;
mod error;
mod gate;
mod rate;

pub use audit::{AuditLogger, AuditRecord, AuditResult, CappedCommand};
pub use error::AuditError;
pub use gate::{classify, Decision, PermissionGate, DENIED_AUTOMATED_PAIRS, DENIED_AUTOMATED_VERBS};
pub use rate::RateLimiter;
