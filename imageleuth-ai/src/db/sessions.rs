//! Batch session database operations

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use imageleuth_common::{Error, Result};

use crate::models::{BatchSession, BatchStatus, BatchTotals, SessionClosing};
use crate::utils::retry_on_lock;

const SESSION_COLUMNS: &str = "id, request_uuid, total_files, success_files, failed_files, \
     started_at, finished_at, duration_ms, status, client_ip, error_message";

/// Insert a `processing` session with zero counts, returning its id
pub async fn insert_session(
    pool: &SqlitePool,
    request_id: Uuid,
    client_origin: &str,
    started_at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<i64> {
    let request_uuid = request_id.to_string();
    let started_at = started_at.to_rfc3339();

    retry_on_lock("insert_session", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO expense_ocr_session
                (request_uuid, total_files, success_files, failed_files,
                 started_at, status, client_ip)
            VALUES (?, 0, 0, 0, ?, 'processing', ?)
            "#,
        )
        .bind(&request_uuid)
        .bind(&started_at)
        .bind(client_origin)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    })
    .await
}

/// Finalize a `processing` session; a finalized session is never rewritten
pub async fn finalize_session(
    pool: &SqlitePool,
    session_id: i64,
    closing: &SessionClosing,
    max_wait_ms: u64,
) -> Result<()> {
    let finished_at = closing.finished_at.to_rfc3339();

    let updated = retry_on_lock("finalize_session", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            UPDATE expense_ocr_session
            SET total_files = ?, success_files = ?, failed_files = ?,
                finished_at = ?, duration_ms = ?, status = ?, error_message = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(closing.totals.total_files as i64)
        .bind(closing.totals.success_files as i64)
        .bind(closing.totals.failed_files as i64)
        .bind(&finished_at)
        .bind(closing.duration_ms)
        .bind(closing.status.as_str())
        .bind(&closing.error_message)
        .bind(session_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    })
    .await?;

    if updated == 0 {
        return Err(Error::NotFound(format!(
            "No open session with id {}",
            session_id
        )));
    }

    Ok(())
}

/// Load one session
pub async fn load_session(pool: &SqlitePool, session_id: i64) -> Result<Option<BatchSession>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM expense_ocr_session WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Most recent sessions first
pub async fn list_recent_sessions(pool: &SqlitePool, limit: i64) -> Result<Vec<BatchSession>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM expense_ocr_session ORDER BY id DESC LIMIT ?",
        SESSION_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(session_from_row).collect()
}

/// Finalize sessions left `processing` by a previous process
///
/// A batch runs inside its request; when the process dies the session can
/// never progress, so it is closed as `error` at startup with totals taken
/// from its detail rows. Detail rows are left untouched.
pub async fn cleanup_stale_sessions(pool: &SqlitePool) -> Result<usize> {
    let stale = sqlx::query("SELECT id, started_at FROM expense_ocr_session WHERE status = 'processing'")
        .fetch_all(pool)
        .await?;

    let finished_at = Utc::now();
    let mut closed = 0;

    for row in &stale {
        let session_id: i64 = row.try_get("id")?;
        let started_at: String = row.try_get("started_at")?;
        let duration_ms = parse_timestamp(&started_at, "started_at")
            .map(|started| imageleuth_common::time::elapsed_ms(started, finished_at))
            .ok();

        let result = sqlx::query(
            r#"
            UPDATE expense_ocr_session
            SET status = 'error',
                finished_at = ?,
                duration_ms = ?,
                error_message = 'interrupted by service restart',
                success_files = (SELECT COUNT(*) FROM expense_ocr_detail d
                                 WHERE d.session_id = expense_ocr_session.id AND d.ocr_status = 'success'),
                failed_files = (SELECT COUNT(*) FROM expense_ocr_detail d
                                WHERE d.session_id = expense_ocr_session.id AND d.ocr_status = 'failed'),
                total_files = (SELECT COUNT(*) FROM expense_ocr_detail d
                               WHERE d.session_id = expense_ocr_session.id)
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(finished_at.to_rfc3339())
        .bind(duration_ms)
        .bind(session_id)
        .execute(pool)
        .await?;

        closed += result.rows_affected() as usize;
    }

    Ok(closed)
}

fn session_from_row(row: &SqliteRow) -> Result<BatchSession> {
    let request_uuid: String = row.try_get("request_uuid")?;
    let request_id = imageleuth_common::uuid_utils::parse_id(&request_uuid)
        .map_err(|e| Error::Internal(format!("Failed to parse request_uuid: {}", e)))?;

    let status: String = row.try_get("status")?;
    let status = BatchStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown session status: {}", status)))?;

    let started_at: String = row.try_get("started_at")?;
    let started_at = parse_timestamp(&started_at, "started_at")?;

    let finished_at: Option<String> = row.try_get("finished_at")?;
    let finished_at = finished_at
        .map(|s| parse_timestamp(&s, "finished_at"))
        .transpose()?;

    Ok(BatchSession {
        session_id: row.try_get("id")?,
        request_id,
        started_at,
        finished_at,
        duration_ms: row.try_get("duration_ms")?,
        status,
        totals: BatchTotals {
            total_files: row.try_get::<i64, _>("total_files")? as usize,
            success_files: row.try_get::<i64, _>("success_files")? as usize,
            failed_files: row.try_get::<i64, _>("failed_files")? as usize,
        },
        client_origin: row.try_get("client_ip")?,
        error_message: row.try_get("error_message")?,
    })
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
