//! Controller module for Game reconciliation
//!
//! This module contains the main controller loop, reconciliation logic,
//! and resource management for Game sessions.

pub mod address;
mod diff;
pub mod ensure;
mod finalizers;
pub mod gateway;
pub mod metrics;
mod reconciler;
pub mod resources;
mod retry;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
pub(crate) mod memory;

pub use address::{wait_for_address, AddressPreference, PollPolicy};
pub use ensure::{ensure, ChildSpec, EnsureOutcome};
pub use finalizers::GAME_FINALIZER;
pub use reconciler::{
    game_ref_for_route, reconcile_game, run_controller, ControllerState, ReconcileOutcome,
};
pub use store::{ChildKind, ChildObject, GameStore, KubeStore};
