//! Session audit API handlers
//!
//! GET /api/sessions, GET /api/sessions/:id

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::{details, sessions},
    error::{ApiError, ApiResult},
    models::{BatchSession, DetailEntry},
    AppState,
};

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 200;

/// GET /api/sessions query
#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub limit: Option<i64>,
}

/// GET /api/sessions/:id response
#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    pub session: BatchSession,
    pub details: Vec<DetailEntry>,
}

/// GET /api/sessions
///
/// Most recent sessions first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<Vec<BatchSession>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let sessions = sessions::list_recent_sessions(&state.db, limit).await?;
    Ok(Json(sessions))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<SessionDetailResponse>> {
    let session = sessions::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))?;

    let details = details::list_details(&state.db, session_id).await?;

    Ok(Json(SessionDetailResponse { session, details }))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
}
