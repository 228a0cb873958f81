//! Custom Resource Definitions for IndieStream
//!
//! `Game` is owned by this operator; the STUNner kinds are external.

mod game;
mod stunner;
mod types;

#[cfg(test)]
mod tests;

pub use game::{Game, GameSpec, GameStatus};
pub use stunner::{
    BackendRef, GatewayConfig, GatewayConfigSpec, ParentRef, RouteRule, UDPRoute, UDPRouteSpec,
};
pub use types::*;
