//! Sync endpoint routes.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_pull, handle_push, PullQuery, PullResponse, PushRequest, PushResponse};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/sync/push", post(push_handler))
        .route("/v1/sync/pull", get(pull_handler))
}

/// POST /v1/sync/push - ingest entries from a replica.
async fn push_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    let response = handle_push(&state.pool, request).await?;
    Ok(Json(response))
}

/// GET /v1/sync/pull - serve entries past the caller's cursor.
async fn pull_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResponse>> {
    let response = handle_pull(&state.pool, query).await?;
    Ok(Json(response))
}
