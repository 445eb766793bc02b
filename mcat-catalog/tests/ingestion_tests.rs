//! Integration tests for quota-gated ingestion
//!
//! Covers admission truncation, atomic commit of items and quota usage,
//! batch abandonment on analysis failure, and per-item isolation of staging
//! and classification failures.

mod helpers;

use helpers::{cache_files, open_store, seed_quota, write_media, FlakyFileSystem, TestCatalog};
use mcat_catalog::db::{CATALOG_KEY, QUOTA_KEY};
use mcat_catalog::{CatalogError, IngestSource};
use mcat_common::events::CatalogEvent;
use std::sync::Arc;
use tokio::sync::broadcast;

fn byte_sources(count: usize) -> Vec<IngestSource> {
    (0..count)
        .map(|i| IngestSource::bytes(format!("payload {}", i).into_bytes(), format!("item-{:03}.png", i)))
        .collect()
}

fn drain(rx: &mut broadcast::Receiver<CatalogEvent>) -> Vec<CatalogEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_batch_truncated_to_remaining_quota() {
    let catalog = TestCatalog::new();
    seed_quota(&catalog.kv, 160);
    let store = open_store(&catalog).await;
    assert_eq!(store.remaining_quota().await, Some(40));

    let outcome = store.ingest(byte_sources(60), "default").await.unwrap();

    assert_eq!(outcome.admitted.len(), 40);
    assert_eq!(outcome.dropped_by_quota, 20);
    assert!(outcome.failures.is_empty());
    assert_eq!(store.items().await.len(), 40);
    assert_eq!(store.quota().await.used, 200);
    assert_eq!(store.remaining_quota().await, Some(0));

    // One analysis call, covering only the admitted prefix
    assert_eq!(catalog.analysis.calls(), 1);
    let requests = catalog.analysis.requests();
    assert_eq!(requests.len(), 40);
    assert_eq!(requests[0].name, "item-000.png");
    assert_eq!(requests[39].name, "item-039.png");
}

#[tokio::test]
async fn test_commit_moves_items_and_quota_together() {
    let catalog = TestCatalog::new();
    let store = open_store(&catalog).await;

    let outcome = store.ingest(byte_sources(3), "shots").await.unwrap();
    assert_eq!(outcome.admitted.len(), 3);

    let items = store.items().await;
    assert_eq!(items.len(), 3);
    assert_eq!(store.quota().await.used, 3);
    for (item, id) in items.iter().zip(&outcome.admitted) {
        assert_eq!(item.id, *id);
        assert_eq!(item.collection_id, "shots");
        assert!(item.is_live());
        assert!(item.legacy_ref.is_none());
        let path = item.durable_path.as_ref().expect("staged item has a path");
        assert!(path.as_path().starts_with(catalog.cache_dir()));
        assert_eq!(
            item.analysis.as_ref().and_then(|a| a.suggested_rename()),
            Some(format!("suggested-{}", item.name).as_str())
        );
    }
    assert_eq!(catalog.analysis.requests()[0].durable_path, items[0].durable_path.as_ref().unwrap().as_path());

    let bytes = store.item_bytes(outcome.admitted[1]).await.unwrap();
    assert_eq!(&bytes[..], b"payload 1");

    // Both values persisted
    let snapshot = catalog.kv.peek(CATALOG_KEY).unwrap();
    assert_eq!(snapshot["version"], "v2");
    assert_eq!(snapshot["items"].as_array().unwrap().len(), 3);
    assert!(snapshot["items"][0].get("transient_handle").is_none());
    let quota = catalog.kv.peek(QUOTA_KEY).unwrap();
    assert_eq!(quota["used"], 3);
}

#[tokio::test]
async fn test_short_analysis_response_abandons_batch() {
    let catalog = TestCatalog::new();
    seed_quota(&catalog.kv, 10);
    let store = open_store(&catalog).await;
    let writes_before = catalog.kv.write_count();
    catalog.analysis.set_short_by(1);

    let err = store.ingest(byte_sources(3), "default").await.unwrap_err();

    assert!(matches!(
        err,
        CatalogError::AnalysisMismatch {
            expected: 3,
            actual: 2
        }
    ));
    assert!(store.items().await.is_empty());
    assert_eq!(store.quota().await.used, 10);
    assert_eq!(store.remaining_quota().await, Some(190));
    assert_eq!(store.handle_registry().live_count(), 0);
    assert!(cache_files(&catalog.cache_dir()).is_empty());
    assert_eq!(catalog.kv.write_count(), writes_before);
    assert!(!store.is_busy().await);
}

#[tokio::test]
async fn test_analysis_error_abandons_batch() {
    let catalog = TestCatalog::new();
    let store = open_store(&catalog).await;
    let writes_before = catalog.kv.write_count();
    catalog.analysis.set_failing(true);

    let err = store.ingest(byte_sources(2), "default").await.unwrap_err();

    assert!(matches!(err, CatalogError::Analysis(_)));
    assert!(store.items().await.is_empty());
    assert_eq!(store.quota().await.used, 0);
    assert_eq!(store.handle_registry().live_count(), 0);
    assert!(cache_files(&catalog.cache_dir()).is_empty());
    assert_eq!(catalog.kv.write_count(), writes_before);

    // The store is usable again once the service recovers
    catalog.analysis.set_failing(false);
    let outcome = store.ingest(byte_sources(2), "default").await.unwrap();
    assert_eq!(outcome.admitted.len(), 2);
    assert_eq!(store.quota().await.used, 2);
}

#[tokio::test]
async fn test_staging_failure_is_isolated_to_its_item() {
    let catalog = TestCatalog::new();
    let (store, _) = catalog
        .builder_with_fs(Arc::new(FlakyFileSystem::failing_writes_to("bad.png")))
        .open_ready()
        .await
        .unwrap();

    let sources = vec![
        IngestSource::bytes(b"one".to_vec(), "good.png"),
        IngestSource::bytes(b"two".to_vec(), "bad.png"),
        IngestSource::bytes(b"three".to_vec(), "other.png"),
    ];
    let outcome = store.ingest(sources, "default").await.unwrap();

    assert_eq!(outcome.admitted.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source, "bad.png");
    assert!(matches!(outcome.failures[0].error, CatalogError::StagingIo { .. }));

    let names: Vec<String> = store.items().await.into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["good.png", "other.png"]);
    // Quota counts committed items only
    assert_eq!(store.quota().await.used, 2);
    assert_eq!(catalog.analysis.requests().len(), 2);
}

#[tokio::test]
async fn test_path_sources_are_referenced_in_place() {
    let catalog = TestCatalog::new();
    let store = open_store(&catalog).await;
    let plain = write_media(&catalog.media_dir(), "plain.pdf", b"%PDF-1.4 plain");
    let via_url = write_media(&catalog.media_dir(), "via url.txt", b"hello");
    let file_url = url::Url::from_file_path(&via_url).unwrap().to_string();

    let sources = vec![
        IngestSource::path(plain.to_string_lossy()),
        IngestSource::path("blob:3f1c2a10-0000-4000-8000-000000000000"),
        IngestSource::path(file_url),
    ];
    let outcome = store.ingest(sources, "docs").await.unwrap();

    assert_eq!(outcome.admitted.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(
        outcome.failures[0].error,
        CatalogError::PathClassification { .. }
    ));

    let items = store.items().await;
    assert_eq!(items[0].durable_path.as_ref().unwrap().as_path(), plain);
    assert_eq!(items[0].mime_type, "application/pdf");
    assert_eq!(items[1].durable_path.as_ref().unwrap().as_path(), via_url);
    assert_eq!(items[1].name, "via url.txt");
    assert_eq!(items[1].size_bytes, 5);
    assert_eq!(&store.item_bytes(items[1].id).await.unwrap()[..], b"hello");

    // Nothing copied into the cache
    assert!(cache_files(&catalog.cache_dir()).is_empty());
    assert_eq!(store.stager().write_count(), 0);
}

#[tokio::test]
async fn test_missing_file_is_skipped() {
    let catalog = TestCatalog::new();
    let store = open_store(&catalog).await;
    let missing = catalog.media_dir().join("gone.png");

    let outcome = store
        .ingest(vec![IngestSource::path(missing.to_string_lossy())], "default")
        .await
        .unwrap();

    assert!(outcome.admitted.is_empty());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(catalog.analysis.calls(), 0);
    assert_eq!(store.quota().await.used, 0);
}

#[tokio::test]
async fn test_exhausted_quota_skips_analysis() {
    let catalog = TestCatalog::new();
    seed_quota(&catalog.kv, 200);
    let store = open_store(&catalog).await;

    let outcome = store.ingest(byte_sources(5), "default").await.unwrap();

    assert!(outcome.admitted.is_empty());
    assert_eq!(outcome.dropped_by_quota, 5);
    assert_eq!(catalog.analysis.calls(), 0);
    assert_eq!(store.stager().write_count(), 0);
    assert!(store.items().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_batches_share_the_quota() {
    let catalog = TestCatalog::new();
    seed_quota(&catalog.kv, 195);
    let store = open_store(&catalog).await;

    let (a, b) = tokio::join!(
        store.ingest(byte_sources(5), "a"),
        store.ingest(byte_sources(5), "b")
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.admitted.len() + b.admitted.len(), 5);
    assert_eq!(a.dropped_by_quota + b.dropped_by_quota, 5);
    assert_eq!(store.items().await.len(), 5);
    assert_eq!(store.quota().await.used, 200);
}

#[tokio::test]
async fn test_ingest_emits_busy_and_commit_events() {
    let catalog = TestCatalog::new();
    let store = open_store(&catalog).await;
    let mut rx = store.subscribe();

    let outcome = store.ingest(byte_sources(2), "default").await.unwrap();
    let events = drain(&mut rx);

    assert!(matches!(events.first(), Some(CatalogEvent::BusyChanged { busy: true, .. })));
    assert!(matches!(events.last(), Some(CatalogEvent::BusyChanged { busy: false, .. })));

    let added = events
        .iter()
        .find_map(|e| match e {
            CatalogEvent::ItemsAdded {
                item_ids,
                quota_used,
                ..
            } => Some((item_ids.clone(), *quota_used)),
            _ => None,
        })
        .expect("ItemsAdded emitted");
    assert_eq!(added, (outcome.admitted.clone(), 2));
    assert!(events
        .iter()
        .any(|e| matches!(e, CatalogEvent::QuotaChanged { used: 2, monthly_cap: Some(200), .. })));
    assert!(!store.is_busy().await);
}
