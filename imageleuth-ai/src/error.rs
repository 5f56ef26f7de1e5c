//! Error types for imageleuth-ai
//!
//! Every API failure is rendered as `{"error": "<message>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{BatchError, ExportError, RenameError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Conflict (409) - a batch is already running
    #[error("{0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// imageleuth-common error
    #[error("{0}")]
    Common(#[from] imageleuth_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Common(imageleuth_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Common(imageleuth_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::EmptyBatch => ApiError::BadRequest(err.to_string()),
            BatchError::Pipeline { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<RenameError> for ApiError {
    fn from(err: RenameError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::NothingToExport => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(format!("导出失败: {}", other)),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
