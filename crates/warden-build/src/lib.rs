//! Warden Build
//!
//! The consent-gated build loop. One call to
//! [`BuildOrchestrator::execute_build`] spends one consented cycle:
//!
//! 1. Kill switch: `blocked`, cycle untouched
//! 2. Mode gate: must be BUILD, armed, consented, inside the arm window
//! 3. Bounded, redacted repository context
//! 4. Proposal from an untrusted [`PatchProvider`]
//! 5. Diff validation (`rejected`), then apply (`error`)
//! 6. One allowlisted test command, run as an argv under a timeout
//! 7. `ok`, or revert and `failed`
//!
//! Every exit after the kill switch resets the actor to PLAN.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod context;
mod error;
mod event;
mod governance;
mod orchestrator;
mod provider;
mod runner;
mod world;

pub use context::{gather_context, redact_line, RepoContext, REDACTED};
pub use error::BuildError;
pub use event::{BuildEvent, PatchMeta, TestMeta};
pub use governance::Governance;
pub use orchestrator::{BuildOrchestrator, KILL_SWITCH_MESSAGE};
pub use provider::{PatchProposal, PatchProvider, PatchRequest, StubProvider};
pub use runner::{TestRun, TestRunner, TestSelection};
pub use world::{WorldMutation, WorldMutator};
