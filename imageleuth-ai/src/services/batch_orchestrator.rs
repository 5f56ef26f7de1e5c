//! Batch orchestrator
//!
//! Drives one uploaded batch through the state machine
//!
//! ```text
//! INIT → RUNNING → DONE
//!              └─→ ERROR
//! ```
//!
//! - **INIT**: open a `processing` session, discard the previous batch's
//!   workspace, clear old exports, allocate a fresh workspace
//! - **RUNNING**: per upload, in order: resolve display name, store bytes,
//!   recognize, write the detail entry, count the outcome
//! - **DONE**: finalize the session with its totals
//! - **ERROR**: a workspace or ledger failure stops the loop; the session is
//!   finalized as `error` with the counts reached so far and detail entries
//!   already written stay in place
//!
//! Per-image problems never reach this level: [`RecognitionInvoker`] turns
//! them into failed records.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::SessionLedger;
use crate::models::{BatchSession, BatchTotals, ExpenseRecord};
use crate::services::recognition_invoker::RecognitionInvoker;
use crate::services::workspace::{self, BatchWorkspace};

/// Message returned for a request without any image
pub const EMPTY_BATCH_MESSAGE: &str = "没有收到文件";

/// One uploaded image
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Name the client sent with the part
    pub original_name: String,
    pub bytes: Vec<u8>,
}

/// Everything the orchestrator needs for one batch
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub uploads: Vec<UploadedImage>,
    /// Index-aligned display names; may be shorter or longer than `uploads`
    pub display_names: Vec<String>,
    pub client_origin: String,
}

/// Result of a batch that reached DONE
#[derive(Debug)]
pub struct BatchOutcome {
    pub session_id: i64,
    pub request_id: Uuid,
    pub workspace: BatchWorkspace,
    /// One record per upload, in upload order
    pub records: Vec<ExpenseRecord>,
    pub totals: BatchTotals,
}

impl BatchOutcome {
    /// Successfully recognized images
    pub fn processed_count(&self) -> usize {
        self.totals.success_files
    }

    pub fn total_count(&self) -> usize {
        self.totals.total_files
    }

    /// Leading records echoed back to the caller
    pub fn preview(&self, limit: usize) -> &[ExpenseRecord] {
        &self.records[..self.records.len().min(limit)]
    }
}

/// What survives a batch that ended in ERROR
#[derive(Debug)]
pub struct PartialBatch {
    pub workspace: BatchWorkspace,
    pub records: Vec<ExpenseRecord>,
}

#[derive(Debug, Error)]
pub enum BatchError {
    /// Rejected before any session was opened
    #[error("{}", EMPTY_BATCH_MESSAGE)]
    EmptyBatch,

    /// Infrastructure failure; the session (if opened) is finalized as `error`
    #[error("{message}")]
    Pipeline {
        session_id: Option<i64>,
        message: String,
        partial: Option<PartialBatch>,
    },
}

impl BatchError {
    pub fn session_id(&self) -> Option<i64> {
        match self {
            BatchError::EmptyBatch => None,
            BatchError::Pipeline { session_id, .. } => *session_id,
        }
    }
}

/// Runs batches end to end
pub struct BatchOrchestrator {
    ledger: Arc<dyn SessionLedger>,
    invoker: RecognitionInvoker,
    temp_root: PathBuf,
    output_dir: PathBuf,
}

impl BatchOrchestrator {
    pub fn new(
        ledger: Arc<dyn SessionLedger>,
        invoker: RecognitionInvoker,
        temp_root: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            ledger,
            invoker,
            temp_root,
            output_dir,
        }
    }

    /// Process one batch
    ///
    /// `previous` is the workspace of the batch this one replaces; it is
    /// discarded once the new session is open.
    pub async fn run(
        &self,
        request: BatchRequest,
        previous: Option<BatchWorkspace>,
    ) -> Result<BatchOutcome, BatchError> {
        if request.uploads.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        // INIT
        let request_id = imageleuth_common::uuid_utils::new_id();
        let started_at = Utc::now();

        let session_id = match self
            .ledger
            .open_session(request_id, &request.client_origin, started_at)
            .await
        {
            Ok(session_id) => session_id,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to open batch session");
                // the caller already gave up the previous batch
                if let Some(previous) = previous {
                    previous.discard().await;
                }
                return Err(BatchError::Pipeline {
                    session_id: None,
                    message: format!("Failed to open batch session: {}", e),
                    partial: None,
                });
            }
        };

        let mut session = BatchSession::open(
            session_id,
            request_id,
            request.client_origin.clone(),
            started_at,
        );

        tracing::info!(
            session_id,
            request_id = %request_id,
            files = request.uploads.len(),
            client_origin = %request.client_origin,
            "Batch started"
        );

        if let Some(previous) = previous {
            previous.discard().await;
        }
        workspace::clear_output_dir(&self.output_dir).await;

        let workspace = match BatchWorkspace::create(&self.temp_root).await {
            Ok(workspace) => workspace,
            Err(e) => {
                let message = format!("Failed to create batch workspace: {}", e);
                return Err(self.abort(&mut session, message, None).await);
            }
        };

        // RUNNING
        let mut records = Vec::with_capacity(request.uploads.len());

        for (index, upload) in request.uploads.iter().enumerate() {
            let file_name =
                workspace::resolve_display_name(index, &upload.original_name, &request.display_names);

            if let Err(e) = workspace.store(&file_name, &upload.bytes).await {
                let message = format!("Failed to store {} in workspace: {}", file_name, e);
                let partial = PartialBatch { workspace, records };
                return Err(self.abort(&mut session, message, Some(partial)).await);
            }

            let record = self.invoker.recognize(&upload.bytes, &file_name).await;

            if let Err(e) = self.ledger.write_detail(session_id, &record).await {
                let message = format!("Failed to record result for {}: {}", file_name, e);
                let partial = PartialBatch { workspace, records };
                return Err(self.abort(&mut session, message, Some(partial)).await);
            }

            session.record_outcome(record.recognition_status);
            records.push(record);
        }

        // DONE
        let closing = session.finish();
        if let Err(e) = self.ledger.close_session(session_id, &closing).await {
            tracing::error!(session_id, error = %e, "Failed to finalize batch session");
            let message = format!("Failed to finalize batch session: {}", e);

            // The row is still `processing`; try to leave it as `error` instead
            let mut failed = BatchSession::open(
                session_id,
                request_id,
                request.client_origin.clone(),
                started_at,
            );
            failed.totals = closing.totals;
            let partial = PartialBatch { workspace, records };
            return Err(self.abort(&mut failed, message, Some(partial)).await);
        }

        tracing::info!(
            session_id,
            total = closing.totals.total_files,
            success = closing.totals.success_files,
            failed = closing.totals.failed_files,
            duration_ms = closing.duration_ms,
            "Batch completed"
        );

        Ok(BatchOutcome {
            session_id,
            request_id,
            workspace,
            records,
            totals: closing.totals,
        })
    }

    /// ERROR transition
    async fn abort(
        &self,
        session: &mut BatchSession,
        message: String,
        partial: Option<PartialBatch>,
    ) -> BatchError {
        tracing::error!(
            session_id = session.session_id,
            processed = session.totals.total_files,
            error = %message,
            "Batch aborted"
        );

        let closing = session.fail(message.clone());
        if let Err(e) = self.ledger.close_session(session.session_id, &closing).await {
            tracing::error!(
                session_id = session.session_id,
                error = %e,
                "Failed to record batch failure; session stays processing until restart"
            );
        }

        BatchError::Pipeline {
            session_id: Some(session.session_id),
            message,
            partial,
        }
    }
}
