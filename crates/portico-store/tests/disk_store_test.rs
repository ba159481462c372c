//! Tests del backend en disco.

use std::time::{Duration, SystemTime};

use portico_store::portico_core::{CacheEntry, CacheKey};
use portico_store::{CacheStore, DiskStore, DiskStoreConfig, StoreError};

fn key(path: &str) -> CacheKey {
    CacheKey::from_path(path).unwrap()
}

fn entry(body: &'static str, status: u16) -> CacheEntry {
    CacheEntry::new(
        body,
        status,
        Some("text/html".to_string()),
        SystemTime::now(),
        Duration::from_secs(60),
    )
}

async fn store(dir: &tempfile::TempDir) -> DiskStore {
    DiskStore::new(&DiskStoreConfig {
        path: dir.path().join("cache"),
        pool_size: 2,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn set_then_get_returns_identical_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir).await;
    let original = entry("<h1>hi</h1>", 200);

    store
        .set(&key("/index.html"), original.clone(), Duration::from_secs(60))
        .await
        .unwrap();

    let cached = store.get(&key("/index.html")).await.unwrap().unwrap();
    assert_eq!(cached.body, original.body);
    assert_eq!(cached.status, 200);
    assert_eq!(cached.content_type.as_deref(), Some("text/html"));
    assert_eq!(cached.ttl, Duration::from_secs(60));
}

#[tokio::test]
async fn miss_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir).await;

    assert!(store.get(&key("/nothing")).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_entry_is_never_returned() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir).await;

    store
        .set(&key("/short"), entry("X", 200), Duration::from_millis(10))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.get(&key("/short")).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_and_invalidate_all() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir).await;
    let ttl = Duration::from_secs(60);

    store.set(&key("/a"), entry("A", 200), ttl).await.unwrap();
    store.set(&key("/b"), entry("B", 404), ttl).await.unwrap();

    store.delete(&key("/a")).await.unwrap();
    // Borrar una key inexistente no es error
    store.delete(&key("/a")).await.unwrap();

    assert!(store.get(&key("/a")).await.unwrap().is_none());
    assert_eq!(store.get(&key("/b")).await.unwrap().unwrap().status, 404);

    store.invalidate_all().await.unwrap();
    assert!(store.get(&key("/b")).await.unwrap().is_none());
    assert!(store.health_check().await.is_ok());
}

#[tokio::test]
async fn missing_root_reports_backend_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cache");
    let store = DiskStore::new(&DiskStoreConfig {
        path: root.clone(),
        pool_size: 1,
    })
    .await
    .unwrap();

    // Reemplazar el directorio por un archivo rompe el backend
    std::fs::remove_dir_all(&root).unwrap();
    std::fs::write(&root, b"not a directory").unwrap();

    let result = store
        .set(&key("/a"), entry("A", 200), Duration::from_secs(60))
        .await;
    assert!(matches!(result, Err(StoreError::BackendUnavailable { .. })));
    assert!(store.health_check().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_of_one_key_never_yield_a_torn_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(
        DiskStore::new(&DiskStoreConfig {
            path: dir.path().join("cache"),
            pool_size: 8,
        })
        .await
        .unwrap(),
    );
    let key = key("/contended");

    for round in 0..50 {
        let bodies: Vec<String> = (0..4)
            .map(|i| format!("BODY-{round}-{i}-{}", "x".repeat(i * 7)))
            .collect();

        let mut writers = Vec::new();
        for (i, body) in bodies.iter().cloned().enumerate() {
            let store = store.clone();
            let key = key.clone();
            writers.push(tokio::spawn(async move {
                let entry = CacheEntry::new(
                    body,
                    200,
                    Some(format!("text/x-{i}")),
                    SystemTime::now(),
                    Duration::from_secs(60),
                );
                store.set(&key, entry, Duration::from_secs(60)).await
            }));
        }
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        if let Some(cached) = store.get(&key).await.unwrap() {
            let body = std::str::from_utf8(&cached.body).unwrap();
            let index = bodies
                .iter()
                .position(|b| b == body)
                .unwrap_or_else(|| panic!("round {round}: unexpected body {body:?}"));
            assert_eq!(cached.body.len(), bodies[index].len());
            assert_eq!(cached.content_type, Some(format!("text/x-{index}")));
        }
    }

    // Sin contencion la ultima escritura siempre es legible
    store
        .set(&key, entry("final", 200), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(store.get(&key).await.unwrap().unwrap().body.as_ref(), b"final");
}
