//! SQLite sink against a temporary database

use chrono::Utc;
use gleaner_acq::sink::{
    event_row, recent_events, statistics, EventStatus, Row, Sink, SinkError, SinkTable, SqliteSink,
};
use gleaner_common::db::init_database;
use tempfile::TempDir;

async fn open(dir: &TempDir) -> SqliteSink {
    let pool = init_database(&dir.path().join("gleaner.db")).await.unwrap();
    SqliteSink::new(pool).await.unwrap()
}

fn event(item_id: &str) -> Row {
    event_row(Utc::now(), item_id, "Paris, France", EventStatus::Scraped, "Scraped 5 images")
}

fn record(item_id: &str, location: &str, primary: &str) -> Row {
    vec![
        "2024-05-01 10:00:00".to_string(),
        item_id.to_string(),
        location.to_string(),
        "2".to_string(),
        format!("000001-x-{id}.jpg; 000002-x-{id}.jpg", id = item_id),
        primary.to_string(),
        "age: 24 - 28".to_string(),
        "{}".to_string(),
    ]
}

#[tokio::test]
async fn test_headers_written_once() {
    let dir = TempDir::new().unwrap();
    let sink = open(&dir).await;
    drop(sink);
    let sink = open(&dir).await;

    for table in SinkTable::ALL {
        let rows = sink.read(table).await.unwrap();
        assert_eq!(rows, vec![table.header()], "{}", table);
    }
}

#[tokio::test]
async fn test_append_preserves_order_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let sink = open(&dir).await;
        sink.append(SinkTable::ExtractionEvents, &[event("00001"), event("00002")])
            .await
            .unwrap();
    }

    let sink = open(&dir).await;
    sink.append(SinkTable::ExtractionEvents, &[event("00003")])
        .await
        .unwrap();

    let rows = sink.read(SinkTable::ExtractionEvents).await.unwrap();
    assert_eq!(rows[0], SinkTable::ExtractionEvents.header());
    let ids: Vec<&str> = rows[1..].iter().map(|r| r[1].as_str()).collect();
    assert_eq!(ids, vec!["00001", "00002", "00003"]);
}

#[tokio::test]
async fn test_wrong_width_rejected_atomically() {
    let dir = TempDir::new().unwrap();
    let sink = open(&dir).await;

    let result = sink
        .append(
            SinkTable::ExtractionEvents,
            &[event("00001"), vec!["too".to_string(), "short".to_string()]],
        )
        .await;
    assert!(matches!(
        result,
        Err(SinkError::ColumnMismatch {
            expected: 5,
            actual: 2,
            ..
        })
    ));
    assert_eq!(sink.read(SinkTable::ExtractionEvents).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_tables_are_independent() {
    let dir = TempDir::new().unwrap();
    let sink = open(&dir).await;

    sink.append(SinkTable::ExtractionEvents, &[event("00001")])
        .await
        .unwrap();
    sink.clear(SinkTable::ErrorEvents, true).await.unwrap();

    assert_eq!(sink.read(SinkTable::ExtractionEvents).await.unwrap().len(), 2);
    assert_eq!(sink.read(SinkTable::ErrorEvents).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_clear_with_and_without_header() {
    let dir = TempDir::new().unwrap();
    let sink = open(&dir).await;
    sink.append(SinkTable::ExtractionEvents, &[event("00001")])
        .await
        .unwrap();

    sink.clear(SinkTable::ExtractionEvents, true).await.unwrap();
    assert_eq!(
        sink.read(SinkTable::ExtractionEvents).await.unwrap(),
        vec![SinkTable::ExtractionEvents.header()]
    );

    sink.clear(SinkTable::ExtractionEvents, false).await.unwrap();
    assert!(sink.read(SinkTable::ExtractionEvents).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_header_restored_after_dropping_clear() {
    let dir = TempDir::new().unwrap();
    let sink = open(&dir).await;
    sink.clear(SinkTable::ExtractionEvents, false).await.unwrap();

    sink.append(SinkTable::ExtractionEvents, &[event("00007")])
        .await
        .unwrap();
    sink.append(SinkTable::ExtractionEvents, &[event("00008")])
        .await
        .unwrap();

    let rows = sink.read(SinkTable::ExtractionEvents).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], SinkTable::ExtractionEvents.header());
    assert_eq!(rows[1][1], "00007");
    assert_eq!(rows[2][1], "00008");
}

#[tokio::test]
async fn test_statistics_and_recent_events() {
    let dir = TempDir::new().unwrap();
    let sink = open(&dir).await;

    sink.append(
        SinkTable::ExtractedRecords,
        &[
            record("00001", "Paris, France", "gender=female; origin=Europe"),
            record("00002", "Paris, France", "gender=male; origin=Europe"),
            record("00003", "Berlin, Germany", "gender=female; origin=Mixed"),
        ],
    )
    .await
    .unwrap();
    sink.append(SinkTable::ExtractionEvents, &[event("00001"), event("00002")])
        .await
        .unwrap();

    let stats = statistics(&sink).await.unwrap();
    assert_eq!(stats.total_items, 3);
    assert_eq!(stats.total_images, 6);
    assert_eq!(stats.per_location.get("Paris, France"), Some(&2));
    assert_eq!(stats.per_location.get("Berlin, Germany"), Some(&1));
    assert_eq!(stats.per_primary_category.get("origin=Europe"), Some(&2));
    assert_eq!(stats.per_primary_category.get("gender=female"), Some(&2));

    let latest = recent_events(&sink, SinkTable::ExtractionEvents, 1).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0][1], "00002");
}
