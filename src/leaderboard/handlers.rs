use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use super::types::{
    AttemptQuery, CleanupRequest, DeleteResult, EditResult, EventAdminResult, EventCreateRequest,
    PurgeResult, RawSubmission, ScorePatch, SubmitResult,
};
use crate::shared::{AppError, AppState};

/// Assembles the HTTP surface: public submission/query routes, admin routes
/// gated by the `x-admin-secret` header, and the live event stream.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/laps", post(submit_lap))
        .route("/api/scores", get(list_scores))
        .route("/api/attempts", get(list_attempts))
        .route("/api/ratings", get(list_ratings))
        .route("/api/events", get(list_events))
        .route("/api/events/counts", get(event_counts))
        .route(
            "/api/admin/scores/:id",
            axum::routing::put(edit_score).delete(delete_score),
        )
        .route("/api/admin/events", post(create_event))
        .route("/api/admin/events/:id/live", post(set_live_event))
        .route("/api/admin/clear/event/:id", post(clear_event))
        .route("/api/admin/clear/all", post(clear_all))
        .route("/api/admin/clear/demo", post(clear_demo))
        .route("/api/admin/cleanup", post(cleanup))
        .route("/ws", get(crate::websockets::websocket_handler))
}

async fn health() -> &'static str {
    "ok"
}

/// POST /api/laps
///
/// The single entry point for lap submissions; demo generators and admin
/// tools go through here too, never around the validation.
#[instrument(name = "submit_lap", skip(state, raw))]
async fn submit_lap(
    State(state): State<AppState>,
    Json(raw): Json<RawSubmission>,
) -> Result<Json<Value>, AppError> {
    match state.leaderboard.submit_lap(raw).await? {
        SubmitResult::Accepted { mode, score } => {
            Ok(Json(json!({ "ok": true, "mode": mode, "score": score })))
        }
        SubmitResult::Rejected(reason) => Ok(Json(json!({ "ok": false, "reason": reason }))),
    }
}

/// GET /api/scores
async fn list_scores(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let scores = state.leaderboard.list_scores().await?;
    Ok(Json(json!({ "scores": scores })))
}

/// GET /api/attempts?q=&eventId=&game=&limit=
async fn list_attempts(
    State(state): State<AppState>,
    Query(query): Query<AttemptQuery>,
) -> Result<Json<Value>, AppError> {
    let attempts = state.leaderboard.list_attempts(&query).await?;
    Ok(Json(json!({ "attempts": attempts })))
}

/// GET /api/ratings
async fn list_ratings(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let ratings = state.leaderboard.ratings_map().await?;
    Ok(Json(json!({ "ratings": ratings })))
}

/// GET /api/events
async fn list_events(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let events = state.leaderboard.list_events().await?;
    Ok(Json(json!({ "events": events })))
}

/// GET /api/events/counts
async fn event_counts(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let counts = state.leaderboard.event_counts().await?;
    Ok(Json(json!({ "counts": counts })))
}

fn admin_secret(headers: &HeaderMap) -> &str {
    headers
        .get("x-admin-secret")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// DELETE /api/admin/scores/:id
#[instrument(name = "delete_score", skip(state, headers))]
async fn delete_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    match state
        .leaderboard
        .delete_score(admin_secret(&headers), &id)
        .await?
    {
        DeleteResult::Deleted => Ok(Json(json!({ "ok": true }))),
        DeleteResult::Rejected(reason) => Ok(Json(json!({ "ok": false, "reason": reason }))),
    }
}

/// PUT /api/admin/scores/:id
#[instrument(name = "edit_score", skip(state, headers, patch))]
async fn edit_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<ScorePatch>,
) -> Result<Json<Value>, AppError> {
    match state
        .leaderboard
        .edit_score(admin_secret(&headers), &id, &patch)
        .await?
    {
        EditResult::Updated(score) => Ok(Json(json!({ "ok": true, "score": score }))),
        EditResult::Rejected(reason) => Ok(Json(json!({ "ok": false, "reason": reason }))),
    }
}

/// POST /api/admin/events
#[instrument(name = "create_event", skip(state, headers))]
async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EventCreateRequest>,
) -> Result<Json<Value>, AppError> {
    match state
        .leaderboard
        .create_event(admin_secret(&headers), &request.name)
        .await?
    {
        EventAdminResult::Saved(event) => Ok(Json(json!({ "ok": true, "event": event }))),
        EventAdminResult::Rejected(reason) => Ok(Json(json!({ "ok": false, "reason": reason }))),
    }
}

/// POST /api/admin/events/:id/live
#[instrument(name = "set_live_event", skip(state, headers))]
async fn set_live_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    match state
        .leaderboard
        .set_live_event(admin_secret(&headers), &id)
        .await?
    {
        EventAdminResult::Saved(event) => Ok(Json(json!({ "ok": true, "event": event }))),
        EventAdminResult::Rejected(reason) => Ok(Json(json!({ "ok": false, "reason": reason }))),
    }
}

fn purge_response(result: PurgeResult) -> Json<Value> {
    match result {
        PurgeResult::Purged { scores, attempts } => {
            Json(json!({ "ok": true, "scores": scores, "attempts": attempts }))
        }
        PurgeResult::Rejected(reason) => Json(json!({ "ok": false, "reason": reason })),
    }
}

/// POST /api/admin/clear/event/:id
#[instrument(name = "clear_event", skip(state, headers))]
async fn clear_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let result = state
        .leaderboard
        .clear_event(admin_secret(&headers), &id)
        .await?;
    Ok(purge_response(result))
}

/// POST /api/admin/clear/all
#[instrument(name = "clear_all", skip(state, headers))]
async fn clear_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let result = state.leaderboard.clear_all(admin_secret(&headers)).await?;
    Ok(purge_response(result))
}

/// POST /api/admin/clear/demo
#[instrument(name = "clear_demo", skip(state, headers))]
async fn clear_demo(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let result = state.leaderboard.clear_demo(admin_secret(&headers)).await?;
    Ok(purge_response(result))
}

/// POST /api/admin/cleanup
#[instrument(name = "cleanup", skip(state, headers, request))]
async fn cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CleanupRequest>,
) -> Result<Json<Value>, AppError> {
    let result = state
        .leaderboard
        .cleanup(admin_secret(&headers), &request)
        .await?;
    Ok(purge_response(result))
}
