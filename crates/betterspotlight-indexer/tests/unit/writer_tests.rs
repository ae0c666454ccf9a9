//! Writer end-to-end against a real temp store.

use std::sync::Arc;

use betterspotlight_extractor::NativeExtractor;
use betterspotlight_indexer::scheduler::{PipelineLane, ScheduledItem, WorkItem};
use betterspotlight_indexer::writer::{IndexWriter, WriteOutcome, WriterConfig};
use betterspotlight_indexer::PipelineTelemetry;
use betterspotlight_store::SqliteStore;

async fn writer_fixture() -> (tempfile::TempDir, SqliteStore, IndexWriter) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("index.db")).await.unwrap();
    let writer = IndexWriter::new(
        store.clone(),
        Arc::new(NativeExtractor::new()),
        Arc::new(PipelineTelemetry::new()),
        WriterConfig::default(),
    );
    (dir, store, writer)
}

#[tokio::test]
async fn indexes_a_text_file_atomically() {
    let (dir, store, writer) = writer_fixture().await;
    let file = dir.path().join("report.txt");
    std::fs::write(&file, "Quarterly performance overview and revenue metrics").unwrap();
    let path = file.to_string_lossy().into_owned();

    let outcome = writer.process_one(&path).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Indexed);

    let item = store.get_item_by_path(&path).await.unwrap().unwrap();
    assert!(item.content_hash.is_some());
    assert_eq!(store.chunks_for_item(item.id).await.unwrap().len() as i64,
               store.count_fts_rows_for_item(item.id).await.unwrap());
    assert!(!store.search_fts("quarterly", 10, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn unchanged_content_is_skipped() {
    let (dir, _store, writer) = writer_fixture().await;
    let file = dir.path().join("stable.txt");
    std::fs::write(&file, "unchanging words").unwrap();
    let path = file.to_string_lossy().into_owned();

    assert_eq!(writer.process_one(&path).await.unwrap(), WriteOutcome::Indexed);
    assert_eq!(writer.process_one(&path).await.unwrap(), WriteOutcome::Unchanged);
}

#[tokio::test]
async fn vanished_path_deletes_the_item() {
    let (dir, store, writer) = writer_fixture().await;
    let file = dir.path().join("ephemeral.txt");
    std::fs::write(&file, "soon to vanish marker zzqqx").unwrap();
    let path = file.to_string_lossy().into_owned();

    writer.process_one(&path).await.unwrap();
    std::fs::remove_file(&file).unwrap();
    assert_eq!(writer.process_one(&path).await.unwrap(), WriteOutcome::Deleted);

    assert!(store.get_item_by_path(&path).await.unwrap().is_none());
    assert!(store.search_fts("zzqqx", 10, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn pdf_records_expected_gap_not_failure() {
    let (dir, store, writer) = writer_fixture().await;
    let file = dir.path().join("paper.pdf");
    std::fs::write(&file, b"%PDF-1.4 fake").unwrap();
    let path = file.to_string_lossy().into_owned();

    assert_eq!(
        writer.process_one(&path).await.unwrap(),
        WriteOutcome::ExpectedGap
    );
    let health = store.get_health().await.unwrap();
    assert_eq!(health.total_failures, 0, "expected gap must not degrade health");
    let (critical, expected) = store.failure_counts().await.unwrap();
    assert_eq!(critical, 0);
    assert_eq!(expected, 1);
}

#[tokio::test]
async fn write_batch_counts_outcomes() {
    let (dir, _store, writer) = writer_fixture().await;
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    std::fs::write(&a, "alpha text").unwrap();
    std::fs::write(&b, "beta text").unwrap();

    let batch: Vec<ScheduledItem> = [a, b]
        .iter()
        .map(|p| ScheduledItem {
            item: WorkItem {
                path: p.to_string_lossy().into_owned(),
                epoch: 0,
            },
            lane: PipelineLane::Rebuild,
        })
        .collect();

    let (written, failed) = writer.write_batch(&batch).await;
    assert_eq!(written, 2);
    assert_eq!(failed, 0);
}
