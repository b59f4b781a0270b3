//! Tabular sink for records and logs
//!
//! Three append-only tables with fixed column order. Rows are positional
//! `Vec<String>`; the builders below are the only place that knows the
//! column layout.

pub mod memory;
pub mod sqlite;
pub mod stats;

pub use memory::MemorySink;
pub use sqlite::SqliteSink;
pub use stats::{recent_events, recent_items, statistics, RecordSummary, SinkStatistics};

use crate::models::ItemRecord;
use crate::utils::Retryable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gleaner_common::time::row_timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type Row = Vec<String>;

/// Separator for multi-valued cells
pub const CELL_SEPARATOR: &str = "; ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SinkTable {
    ExtractedRecords,
    ExtractionEvents,
    ErrorEvents,
}

impl SinkTable {
    pub const ALL: [SinkTable; 3] = [
        SinkTable::ExtractedRecords,
        SinkTable::ExtractionEvents,
        SinkTable::ErrorEvents,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SinkTable::ExtractedRecords => "Extracted Records",
            SinkTable::ExtractionEvents => "Extraction Events",
            SinkTable::ErrorEvents => "Error Events",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            SinkTable::ExtractedRecords => &[
                "Timestamp",
                "Item ID",
                "Location",
                "Image Count",
                "Image Files",
                "Primary Categories",
                "Label Ranges",
                "Full Labels JSON",
            ],
            SinkTable::ExtractionEvents => &["Timestamp", "Item ID", "Location", "Status", "Details"],
            SinkTable::ErrorEvents => &[
                "Timestamp",
                "Error Type",
                "Error Message",
                "Location",
                "Item ID",
            ],
        }
    }

    pub fn header(&self) -> Row {
        self.columns().iter().map(|c| c.to_string()).collect()
    }

    pub fn from_name(name: &str) -> Option<SinkTable> {
        SinkTable::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl std::fmt::Display for SinkTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Status column values of the extraction event table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    LocationChange,
    Scraped,
    Skipped,
    Errored,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::LocationChange => "LOCATION_CHANGE",
            EventStatus::Scraped => "SCRAPED",
            EventStatus::Skipped => "SKIPPED",
            EventStatus::Errored => "ERRORED",
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{table}: expected {expected} columns, got {actual}")]
    ColumnMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Retryable for SinkError {
    fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Storage(_))
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        SinkError::Storage(format!("{} timed out after {} ms", operation, after.as_millis()))
    }
}

impl From<gleaner_common::Error> for SinkError {
    fn from(err: gleaner_common::Error) -> Self {
        SinkError::Storage(err.to_string())
    }
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Append rows in order; every row must match the table width
    async fn append(&self, table: SinkTable, rows: &[Row]) -> Result<(), SinkError>;

    /// Header row (if present) followed by rows in append order
    async fn read(&self, table: SinkTable) -> Result<Vec<Row>, SinkError>;

    async fn clear(&self, table: SinkTable, preserve_header: bool) -> Result<(), SinkError>;
}

/// Reject rows whose width differs from the table's column count
pub fn check_widths(table: SinkTable, rows: &[Row]) -> Result<(), SinkError> {
    let expected = table.columns().len();
    match rows.iter().find(|r| r.len() != expected) {
        Some(row) => Err(SinkError::ColumnMismatch {
            table: table.name().to_string(),
            expected,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

/// Drop a leading header row
pub fn data_rows(table: SinkTable, mut rows: Vec<Row>) -> Vec<Row> {
    if rows.first().is_some_and(|r| *r == table.header()) {
        rows.remove(0);
    }
    rows
}

/// Extracted Records row for a finalized item
pub fn record_row(item: &ItemRecord, timestamp: DateTime<Utc>) -> Result<Row, SinkError> {
    let (primary, ranges, json) = match &item.labels {
        Some(labels) => {
            let summary = labels.display_summary();
            (
                summary.primary_categories,
                summary.ranges,
                serde_json::to_string(&labels.to_external_json())?,
            )
        }
        None => (String::new(), String::new(), String::new()),
    };

    Ok(vec![
        row_timestamp(timestamp),
        item.item_id.clone(),
        item.location.clone(),
        item.image_count().to_string(),
        item.filenames().join(CELL_SEPARATOR),
        primary,
        ranges,
        json,
    ])
}

pub fn event_row(
    timestamp: DateTime<Utc>,
    item_id: &str,
    location: &str,
    status: EventStatus,
    details: &str,
) -> Row {
    vec![
        row_timestamp(timestamp),
        item_id.to_string(),
        location.to_string(),
        status.as_str().to_string(),
        details.to_string(),
    ]
}

pub fn error_row(
    timestamp: DateTime<Utc>,
    error_type: &str,
    message: &str,
    location: &str,
    item_id: Option<&str>,
) -> Row {
    vec![
        row_timestamp(timestamp),
        error_type.to_string(),
        message.to_string(),
        location.to_string(),
        item_id.unwrap_or_default().to_string(),
    ]
}
