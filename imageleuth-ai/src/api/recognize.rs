//! Receipt batch API handler
//!
//! POST /api/recognize-expenses

use axum::{
    extract::{ConnectInfo, Multipart, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;

use crate::{
    error::{ApiError, ApiResult},
    models::ExpenseRecord,
    services::{BatchError, BatchRequest, UploadedImage},
    AppState, CurrentBatch,
};

/// Multipart part carrying an image
const FILES_FIELD: &str = "files";
/// Multipart part carrying the index-aligned display name
const FILE_NAMES_FIELDS: [&str; 2] = ["fileNames[]", "fileNames"];

/// POST /api/recognize-expenses response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeResponse {
    pub success: bool,
    pub session_id: i64,
    /// Images recognized successfully
    pub processed_count: usize,
    pub total_count: usize,
    /// Leading records of the batch (`preview_limit`)
    pub results: Vec<ExpenseRecord>,
}

/// POST /api/recognize-expenses
///
/// Runs the whole batch inside the request. Only one batch runs at a time;
/// a concurrent request is answered with 409.
pub async fn recognize_expenses(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Json<RecognizeResponse>> {
    let client_origin = client_origin(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let mut request = read_batch_request(multipart).await?;
    request.client_origin = client_origin;

    if request.uploads.is_empty() {
        tracing::warn!(client_origin = %request.client_origin, "Batch request without files");
        return Err(BatchError::EmptyBatch.into());
    }

    let _gate = state
        .batch_gate
        .try_lock()
        .map_err(|_| ApiError::Conflict("已有批次正在处理，请稍后再试".to_string()))?;

    // The previous batch's cache is cleared before the new one starts
    let previous = state
        .current_batch
        .write()
        .await
        .take()
        .map(|batch| batch.workspace);

    match state.orchestrator.run(request, previous).await {
        Ok(outcome) => {
            let response = RecognizeResponse {
                success: true,
                session_id: outcome.session_id,
                processed_count: outcome.processed_count(),
                total_count: outcome.total_count(),
                results: outcome.preview(state.config.http.preview_limit).to_vec(),
            };

            *state.current_batch.write().await = Some(CurrentBatch {
                session_id: Some(outcome.session_id),
                records: outcome.records,
                workspace: outcome.workspace,
            });

            Ok(Json(response))
        }
        Err(BatchError::Pipeline {
            session_id,
            message,
            partial,
        }) => {
            if let Some(partial) = partial {
                *state.current_batch.write().await = Some(CurrentBatch {
                    session_id,
                    records: partial.records,
                    workspace: partial.workspace,
                });
            }
            *state.last_error.write().await = Some(message.clone());
            Err(ApiError::Internal(message))
        }
        Err(err) => Err(err.into()),
    }
}

/// Collect image parts and display names in arrival order
async fn read_batch_request(mut multipart: Multipart) -> ApiResult<BatchRequest> {
    let mut request = BatchRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == FILES_FIELD {
            let original_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

            // Browsers send an empty, unnamed part when nothing was selected
            if original_name.is_empty() && bytes.is_empty() {
                continue;
            }

            request.uploads.push(UploadedImage {
                original_name,
                bytes: bytes.to_vec(),
            });
        } else if FILE_NAMES_FIELDS.contains(&name.as_str()) {
            let display_name = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read fileNames: {}", e)))?;
            request.display_names.push(display_name);
        } else {
            tracing::debug!(field = %name, "Ignoring unknown multipart field");
        }
    }

    Ok(request)
}

/// First `X-Forwarded-For` entry, else the peer address
pub fn client_origin(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build batch routes
pub fn recognize_routes() -> Router<AppState> {
    Router::new().route("/api/recognize-expenses", post(recognize_expenses))
}
