//! SQLite-backed sink
//!
//! All tables share the `sink_rows` table created by
//! `gleaner_common::db::init_database`; cells are stored as a JSON array.

use super::{check_widths, Row, Sink, SinkError, SinkTable};
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use gleaner_common::db::{get_setting_u64, SETTING_MAX_LOCK_WAIT_MS};
use sqlx::SqlitePool;
use tracing::debug;

const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

const INSERT_HEADER_SQL: &str = r#"
    INSERT INTO sink_rows (table_name, is_header, cells)
    SELECT ?, 1, ?
    WHERE NOT EXISTS (
        SELECT 1 FROM sink_rows WHERE table_name = ? AND is_header = 1
    )
"#;

pub struct SqliteSink {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteSink {
    /// Open the sink, writing any missing table headers
    pub async fn new(pool: SqlitePool) -> Result<Self, SinkError> {
        let max_lock_wait_ms =
            get_setting_u64(&pool, SETTING_MAX_LOCK_WAIT_MS, DEFAULT_MAX_LOCK_WAIT_MS).await?;

        let sink = Self {
            pool,
            max_lock_wait_ms,
        };
        for table in SinkTable::ALL {
            sink.ensure_header(table).await?;
        }
        Ok(sink)
    }

    async fn ensure_header(&self, table: SinkTable) -> Result<(), SinkError> {
        let header = serde_json::to_string(&table.header())?;
        let pool = &self.pool;
        let header = &header;

        retry_on_lock("sink header", self.max_lock_wait_ms, || async move {
            sqlx::query(INSERT_HEADER_SQL)
                .bind(table.name())
                .bind(header.as_str())
                .bind(table.name())
                .execute(pool)
                .await?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Sink for SqliteSink {
    async fn append(&self, table: SinkTable, rows: &[Row]) -> Result<(), SinkError> {
        check_widths(table, rows)?;
        if rows.is_empty() {
            return Ok(());
        }

        let encoded = rows
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let header = serde_json::to_string(&table.header())?;
        let pool = &self.pool;
        let encoded = &encoded;
        let header = &header;

        // one transaction per append keeps multi-row appends all-or-nothing
        retry_on_lock("sink append", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;
            // restores a header removed by clear
            sqlx::query(INSERT_HEADER_SQL)
                .bind(table.name())
                .bind(header.as_str())
                .bind(table.name())
                .execute(&mut *tx)
                .await?;
            for cells in encoded {
                sqlx::query("INSERT INTO sink_rows (table_name, is_header, cells) VALUES (?, 0, ?)")
                    .bind(table.name())
                    .bind(cells.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(table = table.name(), rows = rows.len(), "Sink rows appended");
        Ok(())
    }

    async fn read(&self, table: SinkTable) -> Result<Vec<Row>, SinkError> {
        let cells: Vec<String> = sqlx::query_scalar(
            "SELECT cells FROM sink_rows WHERE table_name = ? ORDER BY is_header DESC, row_id",
        )
        .bind(table.name())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SinkError::Storage(e.to_string()))?;

        cells
            .iter()
            .map(|c| serde_json::from_str::<Row>(c).map_err(SinkError::from))
            .collect()
    }

    async fn clear(&self, table: SinkTable, preserve_header: bool) -> Result<(), SinkError> {
        let sql = if preserve_header {
            "DELETE FROM sink_rows WHERE table_name = ? AND is_header = 0"
        } else {
            "DELETE FROM sink_rows WHERE table_name = ?"
        };
        let pool = &self.pool;

        retry_on_lock("sink clear", self.max_lock_wait_ms, || async move {
            sqlx::query(sql).bind(table.name()).execute(pool).await?;
            Ok(())
        })
        .await?;

        debug!(table = table.name(), preserve_header, "Sink table cleared");
        Ok(())
    }
}
