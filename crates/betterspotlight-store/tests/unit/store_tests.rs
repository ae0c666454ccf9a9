//! Store lifecycle, item CRUD and the atomic chunk invariant.

use betterspotlight_domain::entities::{Chunk, FeedbackAction, NewItem};
use betterspotlight_store::SqliteStore;

async fn open_temp_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("index.db")).await.unwrap();
    (dir, store)
}

fn sample_item(path: &str) -> NewItem {
    NewItem::from_path(path, 1_024, 1_700_000_000.0, 1_700_000_100.0)
}

#[tokio::test]
async fn open_seeds_defaults_and_reopen_preserves_changes() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("index.db");

    let store = SqliteStore::open(&db).await.unwrap();
    assert_eq!(
        store.get_setting("schema_version").await.unwrap().as_deref(),
        Some("2")
    );
    store.set_setting("learningEnabled", "1").await.unwrap();
    store.close().await;

    let reopened = SqliteStore::open(&db).await.unwrap();
    assert_eq!(
        reopened.get_setting("learningEnabled").await.unwrap().as_deref(),
        Some("1"),
        "user-changed settings survive reopen"
    );
}

#[tokio::test]
async fn upsert_is_idempotent_and_preserves_id() {
    let (_dir, store) = open_temp_store().await;
    let item = sample_item("/doc/report.txt");

    let first = store.upsert_item(&item).await.unwrap();
    let second = store.upsert_item(&item).await.unwrap();
    assert_eq!(first, second, "row id stable under unchanged upsert");

    let row = store.get_item_by_path("/doc/report.txt").await.unwrap().unwrap();
    assert_eq!(row.id, first);
    assert_eq!(row.name, "report.txt");
    assert_eq!(row.extension.as_deref(), Some("txt"));
}

#[tokio::test]
async fn atomic_chunk_invariant_holds_through_insert_and_delete() {
    let (_dir, store) = open_temp_store().await;

    let item_id = store.upsert_item(&sample_item("/doc/report.txt")).await.unwrap();
    let chunks = vec![
        Chunk::new("/doc/report.txt", 0, "Quarterly performance overview".to_owned()),
        Chunk::new("/doc/report.txt", 1, "Revenue metrics and projections".to_owned()),
    ];
    store
        .insert_chunks(item_id, "report.txt", "/doc/report.txt", &chunks)
        .await
        .unwrap();

    // Chunk rows and inverted-index rows agree.
    assert_eq!(store.chunks_for_item(item_id).await.unwrap().len(), 2);
    assert_eq!(store.count_fts_rows_for_item(item_id).await.unwrap(), 2);

    let hits = store.search_fts("quarterly", 10, false).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].file_id, item_id);

    // A second item with a unique marker string.
    let other_id = store.upsert_item(&sample_item("/doc/other.txt")).await.unwrap();
    store
        .insert_chunks(
            other_id,
            "other.txt",
            "/doc/other.txt",
            &[Chunk::new("/doc/other.txt", 0, "xyzzy123 marker".to_owned())],
        )
        .await
        .unwrap();

    store.delete_item_by_path("/doc/report.txt").await.unwrap();
    assert!(store.search_fts("quarterly", 10, false).await.unwrap().is_empty());
    assert_eq!(store.count_fts_rows_for_item(item_id).await.unwrap(), 0);

    store.delete_item_by_path("/doc/other.txt").await.unwrap();
    assert!(store.search_fts("xyzzy123", 10, false).await.unwrap().is_empty());
    assert_eq!(store.count_chunks().await.unwrap(), 0);
}

#[tokio::test]
async fn reindexing_replaces_chunks_without_orphans() {
    let (_dir, store) = open_temp_store().await;
    let item_id = store.upsert_item(&sample_item("/notes.md")).await.unwrap();

    store
        .insert_chunks(
            item_id,
            "notes.md",
            "/notes.md",
            &[Chunk::new("/notes.md", 0, "first revision".to_owned())],
        )
        .await
        .unwrap();
    store
        .insert_chunks(
            item_id,
            "notes.md",
            "/notes.md",
            &[
                Chunk::new("/notes.md", 0, "second revision".to_owned()),
                Chunk::new("/notes.md", 1, "appendix".to_owned()),
            ],
        )
        .await
        .unwrap();

    assert_eq!(store.chunks_for_item(item_id).await.unwrap().len(), 2);
    assert_eq!(store.count_fts_rows_for_item(item_id).await.unwrap(), 2);
    assert!(store.search_fts("first", 10, false).await.unwrap().is_empty());
    assert!(!store.search_fts("appendix", 10, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn feedback_aggregation_is_idempotent() {
    let (_dir, store) = open_temp_store().await;
    let item_id = store.upsert_item(&sample_item("/doc/a.txt")).await.unwrap();

    for _ in 0..3 {
        store
            .record_feedback(item_id, FeedbackAction::Opened, "query", 0)
            .await
            .unwrap();
    }
    store
        .record_feedback(item_id, FeedbackAction::Previewed, "query", 1)
        .await
        .unwrap();

    store.aggregate_feedback().await.unwrap();
    let freq = store.get_frequency(item_id).await.unwrap().unwrap();
    assert_eq!(freq.open_count, 3, "only opened events count");

    // Re-running over an unchanged feedback table changes nothing.
    store.aggregate_feedback().await.unwrap();
    let again = store.get_frequency(item_id).await.unwrap().unwrap();
    assert_eq!(again.open_count, 3);
    assert_eq!(again.total_interactions, freq.total_interactions);
}

#[tokio::test]
async fn health_counts_reflect_contentless_items_and_expected_gaps() {
    let (_dir, store) = open_temp_store().await;

    let with_content = store.upsert_item(&sample_item("/a.txt")).await.unwrap();
    store
        .insert_chunks(
            with_content,
            "a.txt",
            "/a.txt",
            &[Chunk::new("/a.txt", 0, "hello world".to_owned())],
        )
        .await
        .unwrap();
    let without_content = store.upsert_item(&sample_item("/b.pdf")).await.unwrap();

    store
        .record_failure(
            without_content,
            "extraction",
            "PDF extraction unavailable (poppler not found)",
        )
        .await
        .unwrap();

    let health = store.get_health().await.unwrap();
    assert_eq!(health.total_indexed_items, 2);
    assert_eq!(health.items_without_content, 1);
    assert_eq!(health.total_failures, 0, "expected gaps never degrade health");
    assert!(health.is_healthy);
    assert!(health.fts_index_size > 0);

    // A critical failure does degrade health.
    store
        .record_failure(without_content, "write", "disk I/O error")
        .await
        .unwrap();
    let degraded = store.get_health().await.unwrap();
    assert_eq!(degraded.total_failures, 1);
    assert!(!degraded.is_healthy);
}

#[tokio::test]
async fn delete_all_clears_inverted_index() {
    let (_dir, store) = open_temp_store().await;
    let id = store.upsert_item(&sample_item("/x.txt")).await.unwrap();
    store
        .insert_chunks(
            id,
            "x.txt",
            "/x.txt",
            &[Chunk::new("/x.txt", 0, "needle haystack".to_owned())],
        )
        .await
        .unwrap();

    store.delete_all().await.unwrap();
    assert_eq!(store.count_items().await.unwrap(), 0);
    assert!(store.search_fts("needle", 10, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn maintenance_operations_run_clean() {
    let (_dir, store) = open_temp_store().await;
    let id = store.upsert_item(&sample_item("/m.txt")).await.unwrap();
    store
        .insert_chunks(
            id,
            "m.txt",
            "/m.txt",
            &[Chunk::new("/m.txt", 0, "maintenance fodder".to_owned())],
        )
        .await
        .unwrap();

    store.optimize_fts().await.unwrap();
    store.fts_integrity_check().await.unwrap();
    assert!(store.integrity_check().await.unwrap());
    store.wal_checkpoint().await.unwrap();
    store.vacuum().await.unwrap();
}
