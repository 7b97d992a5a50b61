//! Warden Evidence
//!
//! Shared append-only, hash-chained sink. Every other Warden component writes
//! its decisions and mutations through an [`EvidenceLog`].
//!
//! # Guarantees
//!
//! - Each line carries `sha256` over its canonical (key-sorted) form minus the
//!   hash itself, plus `prev_sha256` linking it to the line before.
//! - An optional out-of-band key adds an `hmac` over the same bytes.
//! - At the size ceiling the file is renamed `<file>.1` (replacing any older
//!   rotation) and a `log_rotated` marker opens the fresh file.
//! - Write failures flip [`EvidenceLog::is_degraded`] and are swallowed;
//!   governance never depends on the log being writable.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_evidence::{verify, EvidenceLog};
//!
//! let log = EvidenceLog::new("evidence/event_log.jsonl", 5 * 1024 * 1024);
//! log.append(serde_json::json!({"id": "evt_1", "actor": "Alice", "result": "pending"}));
//! assert!(verify(log.path(), None)?.is_clean());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod digest;
mod error;
mod log;
mod verify;

pub use digest::{hex_eq, hmac_hex, DigestError, Sha256Digest};
pub use error::EvidenceError;
pub use log::{canonical_json, EvidenceLog, HASH_FIELD, HMAC_FIELD, PREV_FIELD, TIMESTAMP_FIELD};
pub use verify::{verify, VerifyReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
