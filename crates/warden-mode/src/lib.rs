//! Warden Mode
//!
//! Two-phase consent protocol guarding every mutation:
//! `enter_build_mode` -> `arm` -> `consent(yes)` -> one build -> back to PLAN.
//!
//! The arm window is time-boxed; [`ModeStateManager::can_build`] clears an
//! expired window as it checks. [`ModeStateManager::try_begin_build`] checks
//! and spends the cycle under the actor's lock, once per attempted build, so
//! one consent authorizes at most one attempt.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod manager;
mod state;

pub use manager::ModeStateManager;
pub use state::ActorState;
