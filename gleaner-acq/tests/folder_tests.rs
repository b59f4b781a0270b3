//! Full sessions over the directory-backed surface

mod helpers;

use gleaner_acq::models::AcquisitionState;
use gleaner_acq::services::SessionController;
use gleaner_acq::sink::{MemorySink, SinkTable};
use gleaner_acq::surface::{Credentials, FolderSurfaceFactory};
use helpers::*;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_item(dir: &Path, first: usize, count: usize) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        std::fs::write(dir.join(format!("{}.png", i)), distinct_png(first + i)).unwrap();
    }
}

#[tokio::test]
async fn test_folder_source_session() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source");
    write_item(&source.join("paris").join("a"), 0, 3);
    write_item(&source.join("paris").join("b"), 3, 1);
    write_item(&source.join("paris").join("c"), 4, 3);
    std::fs::write(
        source.join("paris").join("c").join("attributes.json"),
        r#"{"age": 41}"#,
    )
    .unwrap();

    let factory = Arc::new(FolderSurfaceFactory::new(&source, None));
    let sink = Arc::new(MemorySink::new());
    let ctl = SessionController::new(
        test_params(3, 10),
        test_deps(dir.path(), factory, sink.clone()),
    );

    let snapshot = ctl
        .run(5, vec!["Paris, France".to_string(), "Berlin".to_string()])
        .await
        .unwrap();

    // berlin has no folder, so both locations run dry
    assert_eq!(snapshot.state, AcquisitionState::Completed);
    assert!(snapshot.exhausted);
    assert_eq!(snapshot.accepted_count, 2);
    assert_eq!(snapshot.skipped_count, 1);

    let records = sink.rows(SinkTable::ExtractedRecords).await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r[2] == "Paris, France"));
    assert!(records[1][6].contains("age: "));
}

#[tokio::test]
async fn test_folder_source_rejects_wrong_credentials() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source");
    write_item(&source.join("paris").join("a"), 0, 3);

    let required = Credentials::new("someone-else", "other");
    let factory = Arc::new(FolderSurfaceFactory::new(&source, Some(required)));
    let sink = Arc::new(MemorySink::new());
    let ctl = SessionController::new(
        test_params(3, 10),
        test_deps(dir.path(), factory, sink.clone()),
    );

    let snapshot = ctl.run(1, vec!["Paris".to_string()]).await.unwrap();
    assert_eq!(snapshot.state, AcquisitionState::Aborted);
    assert_eq!(snapshot.errors[0].error_type, "AuthError");
    assert!(sink.rows(SinkTable::ExtractedRecords).await.is_empty());
}

#[tokio::test]
async fn test_missing_source_folder_is_driver_failure() {
    let dir = TempDir::new().unwrap();
    let factory = Arc::new(FolderSurfaceFactory::new(dir.path().join("absent"), None));
    let sink = Arc::new(MemorySink::new());
    let ctl = SessionController::new(
        test_params(3, 10),
        test_deps(dir.path(), factory, sink),
    );

    let snapshot = ctl.run(1, vec!["Paris".to_string()]).await.unwrap();
    assert_eq!(snapshot.state, AcquisitionState::Aborted);
    assert_eq!(snapshot.errors[0].error_type, "DriverInitError");
}
