//! Joined FTS search with filter pushdown.

use betterspotlight_domain::entities::{Chunk, NewItem};
use betterspotlight_domain::value_objects::SearchFilters;
use betterspotlight_store::SqliteStore;

async fn seeded_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("index.db")).await.unwrap();

    let docs: &[(&str, i64, f64, &str)] = &[
        ("/home/docs/budget.md", 2_000, 1_700_000_500.0, "annual budget planning spreadsheet notes"),
        ("/home/docs/roadmap.md", 4_000, 1_700_001_000.0, "product roadmap planning for next year"),
        ("/home/code/planner.rs", 8_000, 1_700_002_000.0, "fn plan() { // planning logic }"),
        ("/tmp/scratch.txt", 100, 1_600_000_000.0, "scratch planning buffer"),
    ];
    for (path, size, modified, text) in docs {
        let mut item = NewItem::from_path(path, *size, 1_600_000_000.0, *modified);
        item.content_hash = None;
        let id = store.upsert_item(&item).await.unwrap();
        store
            .insert_chunks(
                id,
                item.name.as_str(),
                path,
                &[Chunk::new(path, 0, (*text).to_owned())],
            )
            .await
            .unwrap();
    }
    (dir, store)
}

#[tokio::test]
async fn joined_search_returns_item_metadata() {
    let (_dir, store) = seeded_store().await;
    let hits = store
        .search_fts_joined("planning", 10, false, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 4);
    assert!(hits.iter().all(|h| h.item_id > 0 && !h.path.is_empty()));
    assert!(hits.iter().any(|h| h.snippet.contains("<b>")));
}

#[tokio::test]
async fn extension_filter_pushdown() {
    let (_dir, store) = seeded_store().await;
    let filters = SearchFilters {
        file_types: vec!["md".to_owned()],
        ..Default::default()
    };
    let hits = store
        .search_fts_joined("planning", 10, false, &filters)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.path.ends_with(".md")));
}

#[tokio::test]
async fn include_and_exclude_path_prefixes() {
    let (_dir, store) = seeded_store().await;

    let include = SearchFilters {
        include_paths: vec!["/home/".to_owned()],
        ..Default::default()
    };
    let hits = store
        .search_fts_joined("planning", 10, false, &include)
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);

    let exclude = SearchFilters {
        exclude_paths: vec!["/home/code/".to_owned(), "/tmp/".to_owned()],
        ..Default::default()
    };
    let hits = store
        .search_fts_joined("planning", 10, false, &exclude)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.path.starts_with("/home/docs/")));
}

#[tokio::test]
async fn size_and_modified_bounds() {
    let (_dir, store) = seeded_store().await;
    let filters = SearchFilters {
        min_size: Some(1_000),
        max_size: Some(5_000),
        modified_after: Some(1_700_000_000.0),
        ..Default::default()
    };
    let hits = store
        .search_fts_joined("planning", 10, false, &filters)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.size >= 1_000 && h.size <= 5_000));
}

#[tokio::test]
async fn sanitized_to_empty_returns_empty_without_touching_index() {
    let (_dir, store) = seeded_store().await;
    let hits = store
        .search_fts_joined("(((:::***", 10, false, &SearchFilters::default())
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn name_fuzzy_prefers_file_names() {
    let (_dir, store) = seeded_store().await;
    let hits = store
        .search_by_name_fuzzy("roadmap", 10, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].name.contains("roadmap"));
}
