//! Database Test Utilities

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create temporary test database with tables created
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_imageleuth.db");
    let pool = imageleuth_ai::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Number of rows in `table`
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    sqlx::query_scalar::<_, i64>(&query)
        .fetch_one(pool)
        .await
        .unwrap()
}
