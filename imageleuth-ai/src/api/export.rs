//! Export download handlers
//!
//! GET /api/download-excel, GET /api/download-renamed-files

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::{
    error::{ApiError, ApiResult},
    services::ExportArtifact,
    AppState,
};

/// GET /api/download-excel
pub async fn download_excel(State(state): State<AppState>) -> ApiResult<Response> {
    let records = state
        .current_batch
        .read()
        .await
        .as_ref()
        .map(|batch| batch.records.clone())
        .unwrap_or_default();

    if records.is_empty() {
        return Err(ApiError::BadRequest(
            "没有可导出的数据，请先进行图片识别".to_string(),
        ));
    }

    let artifact = state.exporter.spreadsheet(records).await?;
    Ok(attachment(artifact))
}

/// GET /api/download-renamed-files
pub async fn download_renamed_files(State(state): State<AppState>) -> ApiResult<Response> {
    let workspace = state
        .current_batch
        .read()
        .await
        .as_ref()
        .map(|batch| batch.workspace.clone())
        .filter(|workspace| workspace.exists())
        .ok_or_else(|| {
            ApiError::BadRequest("没有找到文件会话，请先进行图片识别".to_string())
        })?;

    let artifact = state.exporter.archive(&workspace).await?;
    Ok(attachment(artifact))
}

fn attachment(artifact: ExportArtifact) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name);
    (
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response()
}

/// Build export routes
pub fn export_routes() -> Router<AppState> {
    Router::new()
        .route("/api/download-excel", get(download_excel))
        .route("/api/download-renamed-files", get(download_renamed_files))
}
