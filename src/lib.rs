//! IndieStream operator
//!
//! Reconciles `Game` resources into a coordinator/worker streaming topology
//! reachable through a shared STUNner relay, and publishes the session URL
//! on the Game's status.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod rest_api;

pub use config::OperatorConfig;
pub use error::{Error, Result};
