//! Integration tests del pipeline cache-aside.

mod helpers;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use helpers::*;
use portico_core::ManualClock;
use portico_server::invalidation::InvalidationLoop;
use portico_server::observability::EventKind;
use portico_server::pipeline::{CacheAsidePipeline, CacheStatus, PipelineError};
use portico_store::{CacheStore, MemoryStore};

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let store = Arc::new(MemoryStore::default());
    let origin = CountingOrigin::new("welcome");
    let pipeline = pipeline(store, origin.clone(), RecordingSink::new());

    let first = pipeline.handle(&key("/index.html")).await.unwrap();
    let second = pipeline.handle(&key("/index.html")).await.unwrap();

    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(first.body, second.body);
    assert_eq!(second.content_type.as_deref(), Some("text/plain"));
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn test_query_string_shares_cache_entry() {
    let origin = CountingOrigin::new("page");
    let pipeline = pipeline(
        Arc::new(MemoryStore::default()),
        origin.clone(),
        RecordingSink::new(),
    );

    pipeline
        .handle_path("/page?utm=1", Duration::from_secs(1))
        .await
        .unwrap();
    let cached = pipeline
        .handle_path("/page", Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(cached.cache, CacheStatus::Hit);
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_misses_fetch_origin_once() {
    let origin = CountingOrigin::with_delay("slow", Duration::from_millis(100));
    let pipeline = pipeline(
        Arc::new(MemoryStore::default()),
        origin.clone(),
        RecordingSink::new(),
    );

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.handle(&key("/slow")).await })
        })
        .collect();

    let mut statuses = Vec::new();
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert_eq!(&response.body[..], b"slow");
        statuses.push(response.cache);
    }

    assert_eq!(origin.calls(), 1);
    assert_eq!(
        statuses.iter().filter(|s| **s == CacheStatus::Miss).count(),
        1
    );
    assert!(pipeline.fills().is_empty());
    assert_eq!(pipeline.metrics().coalesced(), 9);
}

#[tokio::test]
async fn test_origin_failure_reaches_every_waiter() {
    let store = Arc::new(MemoryStore::default());
    let origin = CountingOrigin::failing(Duration::from_millis(50));
    let sink = RecordingSink::new();
    let pipeline = pipeline(store.clone(), origin.clone(), sink.clone());

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.handle(&key("/b")).await })
        })
        .collect();

    for task in tasks {
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::OriginUnavailable(_)));
    }

    assert_eq!(origin.calls(), 1);
    assert_eq!(sink.count(EventKind::OriginFetchFailed), 1);
    // Los fallos nunca se cachean
    assert!(store.get(&key("/b")).await.unwrap().is_none());

    origin.set_failing(false);
    let recovered = pipeline.handle(&key("/b")).await.unwrap();
    assert_eq!(recovered.cache, CacheStatus::Miss);
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn test_unreachable_store_bypasses_to_origin() {
    let store = FaultyStore::down();
    let origin = CountingOrigin::new("direct");
    let sink = RecordingSink::new();
    let pipeline = pipeline(store.clone(), origin.clone(), sink.clone());

    let response = pipeline.handle(&key("/a")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.cache, CacheStatus::Bypass);
    assert_eq!(&response.body[..], b"direct");
    assert_eq!(store.writes(), 0);
    assert_eq!(sink.count(EventKind::CacheReadFailed), 1);
    assert_eq!(pipeline.metrics().bypassed(), 1);
}

#[tokio::test]
async fn test_write_failure_still_serves_response() {
    let store = FaultyStore::new();
    store.fail_writes(true);
    let origin = CountingOrigin::new("fresh");
    let sink = RecordingSink::new();
    let pipeline = pipeline(store.clone(), origin.clone(), sink.clone());

    let response = pipeline.handle(&key("/a")).await.unwrap();

    assert_eq!(response.cache, CacheStatus::Miss);
    assert_eq!(&response.body[..], b"fresh");
    assert_eq!(store.writes(), 1);
    assert_eq!(sink.count(EventKind::CacheWriteFailed), 1);

    // Sin entrada escrita, el siguiente request vuelve al origin
    pipeline.handle(&key("/a")).await.unwrap();
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn test_entry_expires_by_pipeline_clock() {
    let clock = Arc::new(ManualClock::new(SystemTime::UNIX_EPOCH));
    let origin = CountingOrigin::new("X");
    let pipeline = Arc::new(
        CacheAsidePipeline::new(
            Arc::new(MemoryStore::default()),
            origin.clone(),
            config(60, Duration::from_secs(5)),
        )
        .with_sink(RecordingSink::new())
        .with_clock(clock.clone()),
    );

    pipeline.handle(&key("/a")).await.unwrap();

    clock.advance(Duration::from_secs(30));
    let fresh = pipeline.handle(&key("/a")).await.unwrap();
    assert_eq!(fresh.cache, CacheStatus::Hit);
    assert_eq!(&fresh.body[..], b"X");
    assert_eq!(origin.calls(), 1);

    clock.advance(Duration::from_secs(31));
    let refetched = pipeline.handle(&key("/a")).await.unwrap();
    assert_eq!(refetched.cache, CacheStatus::Miss);
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn test_leader_timeout_hands_fill_to_follower() {
    let origin = CountingOrigin::with_delay("late", Duration::from_millis(200));
    let pipeline = pipeline(
        Arc::new(MemoryStore::default()),
        origin.clone(),
        RecordingSink::new(),
    );

    let leader = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline
                .handle_within(&key("/a"), Duration::from_millis(50))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let follower = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.handle(&key("/a")).await })
    };

    assert_eq!(leader.await.unwrap(), Err(PipelineError::Timeout));

    let response = follower.await.unwrap().unwrap();
    assert_eq!(&response.body[..], b"late");
    assert_eq!(response.cache, CacheStatus::Miss);
    assert_eq!(origin.calls(), 2);
    assert!(pipeline.fills().is_empty());
    assert_eq!(pipeline.metrics().timeouts(), 1);
}

#[tokio::test]
async fn test_follower_stops_waiting_after_bound() {
    let origin = CountingOrigin::with_delay("slow", Duration::from_millis(300));
    let sink = RecordingSink::new();
    let pipeline = Arc::new(
        CacheAsidePipeline::new(
            Arc::new(MemoryStore::default()),
            origin.clone(),
            config(3600, Duration::from_millis(50)),
        )
        .with_sink(sink.clone()),
    );

    let leader = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.handle(&key("/a")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let follower = pipeline.handle(&key("/a")).await.unwrap();
    let leader = leader.await.unwrap().unwrap();

    assert_eq!(&follower.body[..], b"slow");
    assert_eq!(leader.cache, CacheStatus::Miss);
    assert_eq!(origin.calls(), 2);
    assert_eq!(sink.count(EventKind::FollowerWaitElapsed), 1);
}

#[tokio::test]
async fn test_invalidation_tick_forces_refetch() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::default());
    let origin = CountingOrigin::new("v1");
    let sink = RecordingSink::new();
    let pipeline = pipeline(Arc::clone(&store), origin.clone(), sink.clone());

    pipeline.handle(&key("/a")).await.unwrap();
    pipeline.handle(&key("/b")).await.unwrap();

    let invalidation = InvalidationLoop::new(store, Duration::from_secs(3600), sink);
    invalidation.run_once().await;

    let a = pipeline.handle(&key("/a")).await.unwrap();
    assert_eq!(a.cache, CacheStatus::Miss);
    assert_eq!(origin.calls(), 3);
    assert_eq!(invalidation.state().ticks(), 1);
}

#[tokio::test]
async fn test_single_key_invalidation() {
    let origin = CountingOrigin::new("body");
    let pipeline = pipeline(
        Arc::new(MemoryStore::default()),
        origin.clone(),
        RecordingSink::new(),
    );

    pipeline.handle(&key("/a")).await.unwrap();
    pipeline.handle(&key("/b")).await.unwrap();
    pipeline.invalidate(&key("/a")).await.unwrap();

    assert_eq!(
        pipeline.handle(&key("/a")).await.unwrap().cache,
        CacheStatus::Miss
    );
    assert_eq!(
        pipeline.handle(&key("/b")).await.unwrap().cache,
        CacheStatus::Hit
    );
    assert_eq!(origin.calls(), 3);
}

#[tokio::test]
async fn test_invalid_path_is_rejected_without_fetch() {
    let origin = CountingOrigin::new("never");
    let pipeline = pipeline(
        Arc::new(MemoryStore::default()),
        origin.clone(),
        RecordingSink::new(),
    );

    let err = pipeline
        .handle_path("no-leading-slash", Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidKey(_)));
    assert_eq!(origin.calls(), 0);
}
