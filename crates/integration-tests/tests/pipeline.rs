//! End-to-end tests of the ingest → consume → persist → read pipeline.
//!
//! Everything runs in process: the router is driven with `oneshot`, the
//! topic is a tokio channel and the store is in memory.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use bytes::Bytes;
use orderflow_core::OrderUid;
use orderflow_integration_tests::{MINIMAL_ORDER, Pipeline, full_order};
use orderflow_service::db::InMemoryOrderStore;
use orderflow_service::queue::QueueError;

// =============================================================================
// Ingest and Read
// =============================================================================

#[tokio::test]
async fn test_ingest_then_read_served_from_cache() {
    let pipeline = Pipeline::start(16);

    let (status, body) = pipeline.send("POST", "/ingest", MINIMAL_ORDER).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(&body[..], b"queued");

    assert!(pipeline.wait_for("o1").await);
    assert_eq!(
        pipeline.store.payload("o1"),
        Some(Bytes::from_static(MINIMAL_ORDER.as_bytes()))
    );

    let (status, first) = pipeline.send("GET", "/order/o1", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&first[..], MINIMAL_ORDER.as_bytes());

    let (status, second) = pipeline.send("GET", "/order/o1", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);

    // Both reads came from the cache the consumer populated.
    assert_eq!(pipeline.store.get_calls(), 0);

    assert!(matches!(pipeline.shutdown().await, QueueError::Cancelled));
}

#[tokio::test]
async fn test_unknown_order_is_not_found_without_cache_change() {
    let pipeline = Pipeline::start(16);

    let (status, _) = pipeline.send("GET", "/order/unknown", "").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(pipeline.cache.is_empty());
    assert_eq!(pipeline.store.get_calls(), 1);
}

#[tokio::test]
async fn test_rejected_submission_never_reaches_store() {
    let pipeline = Pipeline::start(16);

    let (status, body) = pipeline
        .send("POST", "/ingest", r#"{"order_uid":"o9","track_number":""}"#)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(&body[..], b"track_number required");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.store.upsert_calls(), 0);
    assert_eq!(pipeline.queue.published(), 0);
}

#[tokio::test]
async fn test_full_order_is_normalized() {
    let pipeline = Pipeline::start(16);
    let document = full_order("b563feb7b2b84b6test", "WBILMTESTTRACK", "b563feb7b2b84b6test", 9_934_930);

    let (status, _) = pipeline
        .send("POST", "/ingest", &document.to_string())
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(pipeline.wait_for("b563feb7b2b84b6test").await);

    assert_eq!(pipeline.store.row_counts(), (1, 1, 1, 1));
    assert_eq!(
        pipeline.store.track_number("b563feb7b2b84b6test").as_deref(),
        Some("WBILMTESTTRACK")
    );
}

// =============================================================================
// Consumer Resilience
// =============================================================================

#[tokio::test]
async fn test_malformed_message_does_not_stop_consumer() {
    let pipeline = Pipeline::start(16);

    pipeline.queue.push(Bytes::from_static(b"{definitely not json"));
    pipeline.queue.push(Bytes::from_static(br#"{"no_uid":true}"#));
    let (status, _) = pipeline.send("POST", "/ingest", MINIMAL_ORDER).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    assert!(pipeline.wait_for("o1").await);
    assert_eq!(pipeline.store.row_counts().0, 1);
    assert!(matches!(pipeline.shutdown().await, QueueError::Cancelled));
}

#[tokio::test]
async fn test_persistence_failure_skips_message_and_continues() {
    let pipeline = Pipeline::start(16);
    pipeline.store.fail_writes(true);

    pipeline.send("POST", "/ingest", MINIMAL_ORDER).await;
    assert!(
        orderflow_integration_tests::eventually(|| pipeline.store.upsert_calls() == 1).await
    );
    assert!(!pipeline.cache.contains("o1"));

    pipeline.store.fail_writes(false);
    let second = MINIMAL_ORDER.replace("\"o1\"", "\"o2\"");
    pipeline.send("POST", "/ingest", &second).await;

    assert!(pipeline.wait_for("o2").await);
    assert!(!pipeline.cache.contains("o1"));
}

#[tokio::test]
async fn test_redelivery_updates_in_place() {
    let pipeline = Pipeline::start(16);
    let first = full_order("o1", "T1", "tx1", 1).to_string();
    let second = full_order("o1", "T2", "tx1", 1).to_string();

    // At-least-once delivery: the same order arrives again with new values.
    pipeline.queue.push(Bytes::from(first));
    pipeline.queue.push(Bytes::from(second.clone()));

    let expected = Bytes::from(second);
    assert!(
        orderflow_integration_tests::eventually(|| {
            pipeline.cache.get("o1").as_ref() == Some(&expected)
        })
        .await
    );
    assert_eq!(pipeline.store.upsert_calls(), 2);
    assert_eq!(pipeline.store.row_counts(), (1, 1, 1, 1));
    assert_eq!(pipeline.store.track_number("o1").as_deref(), Some("T2"));
}

// =============================================================================
// Warm Start
// =============================================================================

#[tokio::test]
async fn test_warm_start_serves_without_store_access() {
    let documents: Vec<_> = (0..5)
        .map(|i| {
            let id = format!("w{i}");
            let raw = Bytes::from(MINIMAL_ORDER.replace("\"o1\"", &format!("\"{id}\"")));
            (OrderUid::parse(&id).unwrap(), raw)
        })
        .collect();
    let store = Arc::new(InMemoryOrderStore::with_documents(documents.clone()));
    let pipeline = Pipeline::start_with_store(store, 5);

    let loaded = pipeline
        .service
        .warm(5, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(loaded, 5);

    for (id, raw) in documents {
        let (status, body) = pipeline.send("GET", &format!("/order/{id}"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, raw);
    }
    assert_eq!(pipeline.store.get_calls(), 0);
}

#[tokio::test]
async fn test_warm_start_respects_capacity() {
    let store = Arc::new(InMemoryOrderStore::with_documents(
        ["a", "b", "c", "d"].map(|id| (OrderUid::parse(id).unwrap(), Bytes::from(id))),
    ));
    let pipeline = Pipeline::start_with_store(store, 2);

    let loaded = pipeline
        .service
        .warm(2, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(loaded, 2);
    assert_eq!(pipeline.cache.len(), 2);
    assert!(pipeline.cache.contains("c"));
    assert!(pipeline.cache.contains("d"));
}
