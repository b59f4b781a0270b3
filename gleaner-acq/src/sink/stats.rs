//! Read-side summaries over sink tables

use super::{data_rows, Row, Sink, SinkError, SinkTable, CELL_SEPARATOR};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregates over the Extracted Records table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SinkStatistics {
    pub total_items: usize,
    pub total_images: usize,
    pub per_location: BTreeMap<String, usize>,
    /// Keyed by `trait=category`
    pub per_primary_category: BTreeMap<String, usize>,
}

/// One Extracted Records row, decoded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub timestamp: String,
    pub item_id: String,
    pub location: String,
    pub image_count: usize,
    pub image_files: Vec<String>,
    pub primary_categories: String,
    pub label_ranges: String,
}

impl RecordSummary {
    fn from_row(row: &Row) -> Option<Self> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        if row.len() < 7 {
            return None;
        }
        Some(Self {
            timestamp: cell(0),
            item_id: cell(1),
            location: cell(2),
            image_count: cell(3).trim().parse().unwrap_or(0),
            image_files: split_cell(&cell(4)),
            primary_categories: cell(5),
            label_ranges: cell(6),
        })
    }
}

fn split_cell(cell: &str) -> Vec<String> {
    cell.split(CELL_SEPARATOR.trim())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn records(sink: &dyn Sink) -> Result<Vec<RecordSummary>, SinkError> {
    let rows = sink.read(SinkTable::ExtractedRecords).await?;
    Ok(data_rows(SinkTable::ExtractedRecords, rows)
        .iter()
        .filter_map(RecordSummary::from_row)
        .collect())
}

pub async fn statistics(sink: &dyn Sink) -> Result<SinkStatistics, SinkError> {
    let mut stats = SinkStatistics::default();

    for record in records(sink).await? {
        stats.total_items += 1;
        stats.total_images += record.image_count;
        *stats.per_location.entry(record.location).or_default() += 1;
        for primary in split_cell(&record.primary_categories) {
            *stats.per_primary_category.entry(primary).or_default() += 1;
        }
    }

    Ok(stats)
}

/// Latest `limit` records, newest first
pub async fn recent_items(sink: &dyn Sink, limit: usize) -> Result<Vec<RecordSummary>, SinkError> {
    let mut all = records(sink).await?;
    all.reverse();
    all.truncate(limit);
    Ok(all)
}

/// Latest `limit` data rows of `table`, newest first
pub async fn recent_events(
    sink: &dyn Sink,
    table: SinkTable,
    limit: usize,
) -> Result<Vec<Row>, SinkError> {
    let mut rows = data_rows(table, sink.read(table).await?);
    rows.reverse();
    rows.truncate(limit);
    Ok(rows)
}
