//! Detail (per-image audit) database operations

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use imageleuth_common::{Error, Result};

use crate::models::{DetailEntry, ExpenseRecord, RecognitionStatus};
use crate::utils::retry_on_lock;

/// Insert one detail row; commits independently of other items
pub async fn insert_detail(
    pool: &SqlitePool,
    session_id: i64,
    record: &ExpenseRecord,
    max_wait_ms: u64,
) -> Result<i64> {
    let raw_json = serde_json::to_string(record)
        .map_err(|e| Error::Internal(format!("Failed to serialize record: {}", e)))?;
    let amount = Some(record.amount.as_str()).filter(|a| !a.is_empty());
    let created_at = Utc::now().to_rfc3339();

    retry_on_lock("insert_detail", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO expense_ocr_detail
                (session_id, file_name, expense_date, expense_category,
                 expense_content, origin, destination, amount, currency,
                 pay_channel, ocr_status, error_message, raw_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(&record.file_name)
        .bind(&record.expense_date)
        .bind(&record.expense_category)
        .bind(&record.expense_content)
        .bind(&record.origin)
        .bind(&record.destination)
        .bind(amount)
        .bind(&record.currency)
        .bind(&record.payment_channel)
        .bind(record.recognition_status.as_str())
        .bind(&record.error_message)
        .bind(&raw_json)
        .bind(&created_at)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    })
    .await
}

/// Detail rows of one session in insertion (upload) order
pub async fn list_details(pool: &SqlitePool, session_id: i64) -> Result<Vec<DetailEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, session_id, file_name, expense_date, expense_category,
               expense_content, origin, destination, amount, currency,
               pay_channel, ocr_status, error_message, raw_json, created_at
        FROM expense_ocr_detail
        WHERE session_id = ?
        ORDER BY id
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(detail_from_row).collect()
}

fn detail_from_row(row: &SqliteRow) -> Result<DetailEntry> {
    let status: String = row.try_get("ocr_status")?;
    let recognition_status = RecognitionStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown detail status: {}", status)))?;

    Ok(DetailEntry {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        file_name: row.try_get("file_name")?,
        expense_date: row.try_get("expense_date")?,
        expense_category: row.try_get("expense_category")?,
        expense_content: row.try_get("expense_content")?,
        origin: row.try_get("origin")?,
        destination: row.try_get("destination")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        payment_channel: row.try_get("pay_channel")?,
        recognition_status,
        error_message: row.try_get("error_message")?,
        raw_json: row.try_get("raw_json")?,
        created_at: row.try_get("created_at")?,
    })
}
