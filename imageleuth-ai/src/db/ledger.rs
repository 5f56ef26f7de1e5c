//! Session ledger
//!
//! Durable audit trail of batch runs: one session row per batch, one detail
//! row per image. Each write commits on its own so a crash mid-batch leaves
//! every completed item on record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;
use imageleuth_common::Result;

use crate::db::{details, sessions};
use crate::models::{ExpenseRecord, SessionClosing};
use crate::utils::db_retry::DEFAULT_MAX_LOCK_WAIT_MS;

/// Persistence seam used by the batch orchestrator
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Create a `processing` session with zero counts and return its id
    async fn open_session(
        &self,
        request_id: Uuid,
        client_origin: &str,
        started_at: DateTime<Utc>,
    ) -> Result<i64>;

    /// Append the detail entry of one processed image
    async fn write_detail(&self, session_id: i64, record: &ExpenseRecord) -> Result<()>;

    /// Finalize the session; the row is immutable afterwards
    async fn close_session(&self, session_id: i64, closing: &SessionClosing) -> Result<()>;
}

/// SQLite-backed ledger
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionLedger for SqliteLedger {
    async fn open_session(
        &self,
        request_id: Uuid,
        client_origin: &str,
        started_at: DateTime<Utc>,
    ) -> Result<i64> {
        let session_id = sessions::insert_session(
            &self.pool,
            request_id,
            client_origin,
            started_at,
            self.max_lock_wait_ms,
        )
        .await?;

        tracing::debug!(session_id, request_id = %request_id, "Session row inserted");
        Ok(session_id)
    }

    async fn write_detail(&self, session_id: i64, record: &ExpenseRecord) -> Result<()> {
        details::insert_detail(&self.pool, session_id, record, self.max_lock_wait_ms).await?;
        Ok(())
    }

    async fn close_session(&self, session_id: i64, closing: &SessionClosing) -> Result<()> {
        sessions::finalize_session(&self.pool, session_id, closing, self.max_lock_wait_ms).await
    }
}
