//! Database initialization
//!
//! Opens (or creates) the SQLite database behind the sink, enables WAL,
//! creates tables idempotently and seeds default settings.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Setting: upper bound for retrying a write on a locked database
pub const SETTING_MAX_LOCK_WAIT_MS: &str = "database_max_lock_wait_ms";

/// Setting: SQLite busy timeout applied to every connection
pub const SETTING_LOCK_RETRY_MS: &str = "database_lock_retry_ms";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets status readers run while the acquisition worker writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_settings_table(&pool).await?;
    create_sink_rows_table(&pool).await?;
    init_default_settings(&pool).await?;

    let timeout_ms: i64 = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?",
    )
    .bind(SETTING_LOCK_RETRY_MS)
    .fetch_optional(&pool)
    .await?
    .unwrap_or(250);

    let pragma_sql = format!("PRAGMA busy_timeout = {}", timeout_ms);
    sqlx::query(&pragma_sql).execute(&pool).await?;

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Rows of every sink table, stored positionally as a JSON array of cells
pub async fn create_sink_rows_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sink_rows (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            is_header INTEGER NOT NULL DEFAULT 0,
            cells TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sink_rows_table ON sink_rows(table_name, row_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure all required settings exist with default values
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, SETTING_MAX_LOCK_WAIT_MS, "5000").await?;
    ensure_setting(pool, SETTING_LOCK_RETRY_MS, "250").await?;
    Ok(())
}

/// Insert `key` with `default` unless it already holds a non-NULL value
async fn ensure_setting(pool: &SqlitePool, key: &str, default: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        WHERE settings.value IS NULL
        "#,
    )
    .bind(key)
    .bind(default)
    .execute(pool)
    .await?;

    Ok(())
}
