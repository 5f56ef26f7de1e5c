//! POST /api/batch-rename

use axum::{extract::rejection::JsonRejection, routing::post, Json, Router};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    services::{plan_renames, RenamePlan, RenameSource},
    AppState,
};

/// POST /api/batch-rename request
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub files: Vec<RenameSource>,
}

/// Plan `<prefix>_<NN><ext>` names; the client applies them on upload
pub async fn batch_rename(
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<Json<RenamePlan>> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let plan = plan_renames(&request.prefix, &request.files)?;

    tracing::info!(prefix = %request.prefix.trim(), files = plan.total_count, "Rename plan created");
    Ok(Json(plan))
}

/// Build rename routes
pub fn rename_routes() -> Router<AppState> {
    Router::new().route("/api/batch-rename", post(batch_rename))
}
