use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppConfig;
use crate::event::EventBus;
use crate::leaderboard::service::LeaderboardService;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub leaderboard: Arc<LeaderboardService>,
    pub event_bus: EventBus,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        leaderboard: Arc<LeaderboardService>,
        event_bus: EventBus,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            leaderboard,
            event_bus,
            config,
        }
    }
}

/// Infrastructure failures.
///
/// These never carry the submission/admin rejection taxonomy; rejections
/// are structured results (`SubmitResult`, `EditResult`, ...) returned
/// synchronously to the caller.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::StorageError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Storage error: {}", msg),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
