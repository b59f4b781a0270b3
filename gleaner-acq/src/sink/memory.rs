//! In-process sink for tests and dry runs

use super::{check_widths, Row, Sink, SinkError, SinkTable};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct TableData {
    header: Option<Row>,
    rows: Vec<Row>,
}

pub struct MemorySink {
    tables: Mutex<HashMap<SinkTable, TableData>>,
    failing_appends: AtomicUsize,
}

impl MemorySink {
    /// Sink with every table's header in place
    pub fn new() -> Self {
        let tables = SinkTable::ALL
            .into_iter()
            .map(|t| {
                (
                    t,
                    TableData {
                        header: Some(t.header()),
                        rows: Vec::new(),
                    },
                )
            })
            .collect();

        Self {
            tables: Mutex::new(tables),
            failing_appends: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` appends fail with a storage error
    pub fn fail_next_appends(&self, count: usize) {
        self.failing_appends.store(count, Ordering::SeqCst);
    }

    /// Data rows only (no header)
    pub async fn rows(&self, table: SinkTable) -> Vec<Row> {
        self.tables
            .lock()
            .await
            .get(&table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn append(&self, table: SinkTable, rows: &[Row]) -> Result<(), SinkError> {
        if self.take_injected_failure() {
            return Err(SinkError::Storage(format!("injected failure on {}", table)));
        }
        check_widths(table, rows)?;

        let mut tables = self.tables.lock().await;
        let data = tables.entry(table).or_default();
        // a header dropped by clear comes back with the next write
        data.header.get_or_insert_with(|| table.header());
        data.rows.extend(rows.iter().cloned());
        Ok(())
    }

    async fn read(&self, table: SinkTable) -> Result<Vec<Row>, SinkError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(&table)
            .map(|t| t.header.iter().chain(t.rows.iter()).cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, table: SinkTable, preserve_header: bool) -> Result<(), SinkError> {
        let mut tables = self.tables.lock().await;
        let data = tables.entry(table).or_default();
        data.rows.clear();
        if !preserve_header {
            data.header = None;
        }
        Ok(())
    }
}
