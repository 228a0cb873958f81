//! Axum HTTP server for health, metrics and Game lookups

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::controller::{metrics, ControllerState};
use crate::error::{Error, Result};

use super::handlers;

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::encode_registry() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Routes served by the operator
pub fn router(state: Arc<ControllerState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/games/:namespace/:name", get(handlers::get_game))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until shutdown is requested
pub async fn run_server(state: Arc<ControllerState>) -> Result<()> {
    let addr = state.config.metrics_addr;
    let shutdown = state.shutdown.clone();
    let app = router(state);

    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::ConfigError(format!("Server error: {}", e)))?;

    Ok(())
}
