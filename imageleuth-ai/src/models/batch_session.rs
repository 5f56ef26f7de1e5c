//! Batch session lifecycle
//!
//! A session is opened as `processing` before the first image is handled
//! and finalized exactly once as `done` or `error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RecognitionStatus;

/// Persisted session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Batch loop is running (or the process died mid-batch)
    Processing,
    /// Every item was processed
    Done,
    /// A pipeline-level failure aborted the loop
    Error,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Done => "done",
            BatchStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(BatchStatus::Processing),
            "done" => Some(BatchStatus::Done),
            "error" => Some(BatchStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Done | BatchStatus::Error)
    }
}

/// Per-batch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTotals {
    pub total_files: usize,
    pub success_files: usize,
    pub failed_files: usize,
}

impl BatchTotals {
    /// Count one processed item
    pub fn record(&mut self, status: RecognitionStatus) {
        self.total_files += 1;
        match status {
            RecognitionStatus::Success => self.success_files += 1,
            RecognitionStatus::Failed => self.failed_files += 1,
        }
    }
}

/// Values written when a session is finalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClosing {
    pub status: BatchStatus,
    pub totals: BatchTotals,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

/// Audit/aggregate record of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSession {
    pub session_id: i64,
    /// Opaque unique token generated at batch start
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: BatchStatus,
    #[serde(flatten)]
    pub totals: BatchTotals,
    /// Caller's network origin
    pub client_origin: String,
    pub error_message: Option<String>,
}

impl BatchSession {
    /// In-memory view of a freshly opened session
    pub fn open(
        session_id: i64,
        request_id: Uuid,
        client_origin: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            request_id,
            started_at,
            finished_at: None,
            duration_ms: None,
            status: BatchStatus::Processing,
            totals: BatchTotals::default(),
            client_origin,
            error_message: None,
        }
    }

    /// Count one item whose detail entry has been written
    pub fn record_outcome(&mut self, status: RecognitionStatus) {
        self.totals.record(status);
    }

    /// Finalize as `done`
    pub fn finish(&mut self) -> SessionClosing {
        self.close(BatchStatus::Done, None)
    }

    /// Finalize as `error`; counters keep the items processed so far
    pub fn fail(&mut self, message: impl Into<String>) -> SessionClosing {
        self.close(BatchStatus::Error, Some(message.into()))
    }

    fn close(&mut self, status: BatchStatus, error_message: Option<String>) -> SessionClosing {
        debug_assert!(!self.is_terminal(), "session finalized twice");

        let finished_at = Utc::now();
        let duration_ms = imageleuth_common::time::elapsed_ms(self.started_at, finished_at);

        self.status = status;
        self.finished_at = Some(finished_at);
        self.duration_ms = Some(duration_ms);
        self.error_message = error_message.clone();

        SessionClosing {
            status,
            totals: self.totals,
            finished_at,
            duration_ms,
            error_message,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
