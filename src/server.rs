use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::competition::CompetitionStore;
use crate::error::CompetitionError;
use crate::leaderboard::Leaderboard;
use crate::types::{CompetitionWindow, LeaderboardResponse, SourceKey};

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub leaderboard: Arc<Leaderboard>,
    pub competitions: Arc<CompetitionStore>,
    /// Number of ranked rows returned per request.
    pub limit: usize,
}

/// Error body returned by the API: `{ message, error? }`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal { message: String, error: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
            }
            Self::Internal { message, error } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": message, "error": error })),
            )
                .into_response(),
        }
    }
}

impl From<CompetitionError> for ApiError {
    fn from(err: CompetitionError) -> Self {
        match err {
            CompetitionError::NoActiveCompetition => {
                Self::NotFound("No active competition found".to_string())
            }
            other => Self::Internal {
                message: "Competition store error".to_string(),
                error: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub message: String,
    pub competition: CompetitionWindow,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/competition", get(competition))
        .route("/api/competition/reset", post(reset_competition))
        .with_state(state)
}

/// `GET /api/leaderboard?source=`. Always answers with some leaderboard.
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Json<LeaderboardResponse> {
    let key = SourceKey::from_query(params.source.as_deref());
    let prize_pool = match state.competitions.current().await {
        Ok(window) => window.total_prize_pool,
        Err(e) => {
            warn!("{e}, using configured prize pool");
            state.competitions.settings().prize_pool
        }
    };
    Json(state.leaderboard.present(key, state.limit, prize_pool).await)
}

/// `GET /api/competition`
pub async fn competition(
    State(state): State<AppState>,
) -> Result<Json<CompetitionWindow>, ApiError> {
    Ok(Json(state.competitions.current().await?))
}

/// `POST /api/competition/reset`
pub async fn reset_competition(
    State(state): State<AppState>,
) -> Result<Json<ResetResponse>, ApiError> {
    let competition = state
        .competitions
        .reset(Utc::now())
        .await
        .map_err(|e| ApiError::Internal {
            message: "Failed to reset competition".to_string(),
            error: e.to_string(),
        })?;
    state.leaderboard.clear().await;
    info!("Competition reset, new id {}", competition.id);
    Ok(Json(ResetResponse {
        message: "Competition reset successfully".to_string(),
        competition,
    }))
}
