//! Database access for imageleuth-ai
//!
//! SQLite-backed session ledger: one `expense_ocr_session` row per batch,
//! one `expense_ocr_detail` row per processed image.

pub mod details;
pub mod ledger;
pub mod sessions;

pub use ledger::{SessionLedger, SqliteLedger};

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Initialize database connection pool and create tables if missing
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the ledger tables
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS expense_ocr_session (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_uuid TEXT NOT NULL UNIQUE,
            total_files INTEGER NOT NULL DEFAULT 0,
            success_files INTEGER NOT NULL DEFAULT 0,
            failed_files INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            duration_ms INTEGER,
            status TEXT NOT NULL DEFAULT 'processing'
                CHECK (status IN ('processing', 'done', 'error')),
            client_ip TEXT NOT NULL DEFAULT '',
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS expense_ocr_detail (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES expense_ocr_session(id),
            file_name TEXT NOT NULL,
            expense_date TEXT NOT NULL,
            expense_category TEXT NOT NULL DEFAULT '',
            expense_content TEXT NOT NULL DEFAULT '',
            origin TEXT NOT NULL DEFAULT '',
            destination TEXT NOT NULL DEFAULT '',
            amount TEXT,
            currency TEXT NOT NULL DEFAULT '',
            pay_channel TEXT NOT NULL DEFAULT '',
            ocr_status TEXT NOT NULL CHECK (ocr_status IN ('success', 'failed')),
            error_message TEXT,
            raw_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_expense_ocr_detail_session ON expense_ocr_detail(session_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (expense_ocr_session, expense_ocr_detail)");

    Ok(())
}
