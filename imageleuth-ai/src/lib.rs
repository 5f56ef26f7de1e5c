//! imageleuth-ai library interface
//!
//! Receipt recognition service: uploads are driven through the batch
//! pipeline, audited in SQLite and exported as xlsx / zip.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use imageleuth_common::config::TomlConfig;

use crate::db::SqliteLedger;
use crate::models::ExpenseRecord;
use crate::services::{BatchOrchestrator, BatchWorkspace, Exporter, RecognitionInvoker, Recognizer};

/// Results and workspace of the most recent batch
///
/// Replaced wholesale by the next batch, never merged.
#[derive(Debug, Clone)]
pub struct CurrentBatch {
    /// `None` only if the batch failed before its session was opened
    pub session_id: Option<i64>,
    pub records: Vec<ExpenseRecord>,
    pub workspace: BatchWorkspace,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<TomlConfig>,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub exporter: Exporter,
    /// Most recent batch (single slot)
    pub current_batch: Arc<RwLock<Option<CurrentBatch>>>,
    /// Held for the whole run of a batch; a second batch gets 409
    pub batch_gate: Arc<Mutex<()>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire the pipeline over `db`, keeping workspaces under `temp_dir` and
    /// exports under `output_dir`
    pub fn new(
        db: SqlitePool,
        config: TomlConfig,
        recognizer: Arc<dyn Recognizer>,
        temp_dir: &Path,
        output_dir: &Path,
    ) -> Self {
        let ledger = Arc::new(SqliteLedger::new(db.clone()));
        let orchestrator = BatchOrchestrator::new(
            ledger,
            RecognitionInvoker::new(recognizer),
            temp_dir.to_path_buf(),
            output_dir.to_path_buf(),
        );

        Self::with_orchestrator(db, config, orchestrator, output_dir)
    }

    /// Same as [`AppState::new`] with a prebuilt orchestrator
    pub fn with_orchestrator(
        db: SqlitePool,
        config: TomlConfig,
        orchestrator: BatchOrchestrator,
        output_dir: &Path,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            exporter: Exporter::new(output_dir.to_path_buf()),
            current_batch: Arc::new(RwLock::new(None)),
            batch_gate: Arc::new(Mutex::new(())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.http.allowed_origins);
    let body_limit = DefaultBodyLimit::max(state.config.http.max_upload_bytes);

    Router::new()
        .merge(api::recognize_routes())
        .merge(api::rename_routes())
        .merge(api::export_routes())
        .merge(api::results_routes())
        .merge(api::session_routes())
        .merge(api::health_routes())
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy; an empty allow-list admits any origin
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION])
}
