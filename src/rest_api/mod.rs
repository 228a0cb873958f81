//! HTTP surface of the operator
//!
//! Health, Prometheus metrics and a read-only view of each Game's URL.

mod handlers;
mod server;

pub use handlers::{GameUrlResponse, HealthResponse};
pub use server::{router, run_server};
