use async_trait::async_trait;
use bytes::Bytes;
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use url::Url;

use unsplash_cache::sources::RemoteCatalog;
use unsplash_cache::status::StatusReceiver;
use unsplash_cache::{CacheError, CacheResult, CacheStatus, Config, RefillOutcome, UnsplashImageCache};

fn config(dir: &TempDir, endpoint: String, target_unused_count: usize) -> Config {
    let mut config = Config::with_client_id("integration-client");
    config.unsplash.endpoint = endpoint;
    config.cache.root = dir.path().join("images");
    config.cache.target_unused_count = target_unused_count;
    config.database.url = format!("sqlite://{}", dir.path().join("ledger.db").display());
    config
}

fn photo(server: &MockServer, id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "urls": { "full": server.url(format!("/assets/{id}")) },
        "location": { "title": null },
        "user": { "username": format!("user-{id}"), "first_name": "First", "last_name": "Last" }
    })
}

async fn mock_batch<'a>(server: &'a MockServer, ids: &[&str]) -> httpmock::Mock<'a> {
    let body = json!(ids.iter().map(|id| photo(server, id)).collect::<Vec<_>>());
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/photos/random")
                .query_param("client_id", "integration-client");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(body);
        })
        .await
}

async fn mock_asset<'a>(server: &'a MockServer, id: &str) -> httpmock::Mock<'a> {
    let path = format!("/assets/{id}");
    let body = format!("bytes-of-{id}");
    server
        .mock_async(|when, then| {
            when.method(GET).path(path);
            then.status(200).body(body);
        })
        .await
}

fn drain(rx: &mut StatusReceiver) -> Vec<CacheStatus> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_refill_registers_and_downloads_new_batch() {
    let server = MockServer::start_async().await;
    let dir = TempDir::new().unwrap();
    let cache = UnsplashImageCache::new(config(&dir, server.url("/photos/random"), 2))
        .await
        .unwrap();

    // One downloaded-unseen record before the scenario starts
    let mut seed = mock_batch(&server, &["seed"]).await;
    mock_asset(&server, "seed").await;
    assert_eq!(cache.pre_cache(Some(1)).await.succeeded(), 1);
    seed.delete_async().await;

    mock_batch(&server, &["A", "B", "C"]).await;
    for id in ["A", "B", "C"] {
        mock_asset(&server, id).await;
    }
    let mut rx = cache.subscribe();

    let outcome = cache.pre_cache(Some(3)).await;

    assert_eq!(outcome.succeeded(), 3);
    let events = drain(&mut rx);
    assert_eq!(
        events.last(),
        Some(&CacheStatus::RequestImagesDone { succeeded: 3 })
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.records, 4);
    assert_eq!(stats.downloaded, 4);
    assert_eq!(stats.downloaded_unseen, 4);

    let records = cache.list_records().await.unwrap();
    let new: Vec<_> = records
        .iter()
        .filter(|r| ["A", "B", "C"].contains(&r.id.as_str()))
        .collect();
    assert_eq!(new.len(), 3);
    assert!(new.iter().all(|r| r.downloaded && r.last_seen.is_never()));
    assert_eq!(new[0].publisher_display_name().as_deref(), Some("First Last"));
}

#[tokio::test]
async fn test_threshold_reached_skips_network() {
    let server = MockServer::start_async().await;
    let dir = TempDir::new().unwrap();
    let cache = UnsplashImageCache::new(config(&dir, server.url("/photos/random"), 2))
        .await
        .unwrap();

    let batch = mock_batch(&server, &["a", "b"]).await;
    mock_asset(&server, "a").await;
    mock_asset(&server, "b").await;
    assert_eq!(cache.pre_cache(Some(2)).await.succeeded(), 2);
    assert_eq!(batch.hits_async().await, 1);

    let mut rx = cache.subscribe();
    let outcome = cache.pre_cache(Some(2)).await;

    assert_eq!(outcome, RefillOutcome::Skipped { unseen: 2 });
    assert_eq!(drain(&mut rx), vec![CacheStatus::SkipFetchTargetUnseenReached]);
    assert_eq!(batch.hits_async().await, 1);
}

#[tokio::test]
async fn test_dedup_is_idempotent_across_refills() {
    let server = MockServer::start_async().await;
    let dir = TempDir::new().unwrap();
    let cache = UnsplashImageCache::new(config(&dir, server.url("/photos/random"), 100))
        .await
        .unwrap();

    let batch = mock_batch(&server, &["x", "y"]).await;
    let asset_x = mock_asset(&server, "x").await;
    let asset_y = mock_asset(&server, "y").await;

    assert_eq!(cache.pre_cache(Some(2)).await.succeeded(), 2);
    assert_eq!(cache.pre_cache(Some(2)).await.succeeded(), 0);

    assert_eq!(batch.hits_async().await, 2);
    assert_eq!(asset_x.hits_async().await, 1);
    assert_eq!(asset_y.hits_async().await, 1);
    assert_eq!(cache.stats().await.unwrap().records, 2);
}

#[tokio::test]
async fn test_malformed_response_leaves_ledger_untouched() {
    let server = MockServer::start_async().await;
    let dir = TempDir::new().unwrap();
    let cache = UnsplashImageCache::new(config(&dir, server.url("/photos/random"), 10))
        .await
        .unwrap();

    let body = json!([photo(&server, "ok"), { "id": "broken", "urls": { "small": "x" } }]);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/photos/random");
            then.status(200).json_body(body);
        })
        .await;

    let outcome = cache.pre_cache(Some(2)).await;

    assert_eq!(outcome, RefillOutcome::Failed);
    assert_eq!(cache.stats().await.unwrap().records, 0);
    assert!(cache.next_unseen().await.is_none());
}

#[tokio::test]
async fn test_state_survives_restart() {
    let server = MockServer::start_async().await;
    let dir = TempDir::new().unwrap();

    {
        let cache = UnsplashImageCache::new(config(&dir, server.url("/photos/random"), 10))
            .await
            .unwrap();
        mock_batch(&server, &["p", "q"]).await;
        mock_asset(&server, "p").await;
        mock_asset(&server, "q").await;
        assert_eq!(cache.pre_cache(None).await.succeeded(), 2);
        let (_, first) = cache.next_unseen().await.unwrap();
        assert_eq!(first.id, "p");
    }

    let reopened = UnsplashImageCache::new(config(&dir, server.url("/photos/random"), 10))
        .await
        .unwrap();
    let stats = reopened.stats().await.unwrap();
    assert_eq!(stats.records, 2);
    assert_eq!(stats.downloaded_unseen, 1);

    let (bytes, next) = reopened.next_unseen().await.unwrap();
    assert_eq!(next.id, "q");
    assert_eq!(bytes.as_ref(), b"bytes-of-q");
}

/// In-process catalog serving canned metadata and bytes
struct StaticCatalog {
    items: Vec<(&'static str, &'static [u8])>,
    asset_requests: AtomicUsize,
}

#[async_trait]
impl RemoteCatalog for StaticCatalog {
    fn batch_url(&self, count: usize, _collections: Option<&[String]>) -> CacheResult<Url> {
        Url::parse(&format!("memory://catalog/random?count={count}"))
            .map_err(|e| CacheError::configuration(e.to_string()))
    }

    async fn fetch_batch_body(&self, _url: &Url) -> CacheResult<Bytes> {
        let body: Vec<_> = self
            .items
            .iter()
            .map(|(id, _)| json!({ "id": id, "urls": { "full": format!("memory://assets/{id}") } }))
            .collect();
        Ok(Bytes::from(serde_json::to_vec(&body).map_err(|e| CacheError::format(e.to_string()))?))
    }

    async fn fetch_asset(&self, url: &str) -> CacheResult<Bytes> {
        self.asset_requests.fetch_add(1, Ordering::SeqCst);
        self.items
            .iter()
            .find(|(id, _)| url == format!("memory://assets/{id}"))
            .map(|(_, data)| Bytes::from_static(*data))
            .ok_or_else(|| CacheError::transport(url, "no such asset"))
    }
}

#[tokio::test]
async fn test_round_robin_selection_with_custom_catalog() {
    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(StaticCatalog {
        items: vec![
            ("one", b"1".as_slice()),
            ("two", b"2".as_slice()),
            ("three", b"3".as_slice()),
        ],
        asset_requests: AtomicUsize::new(0),
    });
    let cache = UnsplashImageCache::with_catalog(
        config(&dir, "http://unused.invalid/".into(), 10),
        catalog.clone(),
    )
    .await
    .unwrap();

    assert_eq!(cache.pre_cache(Some(3)).await.succeeded(), 3);
    assert_eq!(catalog.asset_requests.load(Ordering::SeqCst), 3);

    let mut seen = Vec::new();
    for _ in 0..6 {
        let (_, record) = cache.next_unseen().await.unwrap();
        seen.push(record.id);
    }

    // First cycle by id among never-seen, then the same order again
    assert_eq!(seen[..3], ["one", "three", "two"]);
    assert_eq!(seen[3..], seen[..3]);
    for window in seen.windows(2) {
        assert_ne!(window[0], window[1]);
    }
}

#[tokio::test]
async fn test_background_refill_reports_terminal_event() {
    let server = MockServer::start_async().await;
    let dir = TempDir::new().unwrap();
    let cache = UnsplashImageCache::new(config(&dir, server.url("/photos/random"), 10))
        .await
        .unwrap();
    mock_batch(&server, &["bg"]).await;
    mock_asset(&server, "bg").await;

    let mut rx = cache.subscribe();
    let handle = cache.spawn_pre_cache(Some(1));

    let mut events = Vec::new();
    loop {
        let event = rx.recv().await.unwrap();
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }

    assert_eq!(handle.await.unwrap().succeeded(), 1);
    assert!(matches!(events[0], CacheStatus::Requesting { .. }));
    assert_eq!(events[1], CacheStatus::RequestApiSuccess);
    assert_eq!(events[2], CacheStatus::RequestImagesDone { succeeded: 1 });
}
