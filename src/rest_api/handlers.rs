//! Request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::controller::ControllerState;
use crate::crd::{Game, GamePhase};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Published address of a Game session
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUrlResponse {
    pub name: String,
    pub namespace: String,
    pub title: String,
    /// Empty until the session is reachable
    pub url: String,
    pub phase: GamePhase,
    pub ready: bool,
}

impl GameUrlResponse {
    fn from_game(game: &Game) -> Self {
        let status = game.status.clone().unwrap_or_default();
        Self {
            name: game.name_any(),
            namespace: game.namespace().unwrap_or_default(),
            title: game.spec.title.clone(),
            ready: status.is_ready(),
            url: status.url,
            phase: status.phase,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: String) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
        }),
    )
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/v1/games/:namespace/:name
pub async fn get_game(
    State(state): State<Arc<ControllerState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<GameUrlResponse>, ApiError> {
    match state.store.get_game(&namespace, &name).await {
        Ok(Some(game)) => Ok(Json(GameUrlResponse::from_game(&game))),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Game {}/{} not found", namespace, name),
        )),
        Err(e) => {
            warn!("Failed to read Game {}/{}: {}", namespace, name, e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                e.to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::OperatorConfig;
    use crate::controller::fixtures::test_game;
    use crate::controller::memory::MemoryStore;
    use crate::crd::GameStatus;

    fn state_with(store: MemoryStore) -> Arc<ControllerState> {
        Arc::new(ControllerState {
            store: Arc::new(store),
            config: OperatorConfig::default(),
            shutdown: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn test_ready_game_reports_url() {
        let store = MemoryStore::new();
        let mut game = test_game("g1", "Zelda", "zelda.rom");
        game.status = Some(GameStatus {
            url: "http://34.1.1.1".to_string(),
            phase: GamePhase::Ready,
            ..Default::default()
        });
        store.insert_game(game);

        let Json(body) = get_game(
            State(state_with(store)),
            Path(("default".to_string(), "g1".to_string())),
        )
        .await
        .unwrap();

        assert_eq!(body.url, "http://34.1.1.1");
        assert_eq!(body.title, "Zelda");
        assert!(body.ready);
    }

    #[tokio::test]
    async fn test_pending_game_has_empty_url() {
        let store = MemoryStore::new();
        store.insert_game(test_game("g1", "Zelda", "zelda.rom"));

        let Json(body) = get_game(
            State(state_with(store)),
            Path(("default".to_string(), "g1".to_string())),
        )
        .await
        .unwrap();

        assert!(body.url.is_empty());
        assert_eq!(body.phase, GamePhase::Pending);
        assert!(!body.ready);
    }

    #[tokio::test]
    async fn test_unknown_game_is_404() {
        let (status, Json(body)) = get_game(
            State(state_with(MemoryStore::new())),
            Path(("default".to_string(), "ghost".to_string())),
        )
        .await
        .unwrap_err();

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "not_found");
    }
}
