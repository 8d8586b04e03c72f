//! Read/write coordinator for orders.
//!
//! Owns no state of its own: it ties the cache, the store and the queue
//! publisher together.
//!
//! - `ingest` validates a submission and hands the raw bytes to the queue.
//!   Success means "accepted for processing"; persistence happens later in
//!   the consumer.
//! - `get` is cache-aside: cache first, then the store, populating the cache
//!   on a store hit unless the consumer cached the order in the meantime.
//! - `warm` copies the most recently updated orders into the cache.

mod error;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use orderflow_core::{OrderUid, ValidationError, validate_submission};
use tracing::{debug, info, instrument};

pub use error::ServiceError;

use crate::cache::OrderCache;
use crate::db::{OrderStore, RepositoryError};
use crate::queue::OrderPublisher;

/// Coordinates the HTTP read and write paths.
///
/// Cheap to clone; all clones share the same cache, store and publisher.
#[derive(Clone)]
pub struct OrderService {
    inner: Arc<OrderServiceInner>,
}

struct OrderServiceInner {
    cache: Arc<OrderCache>,
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn OrderPublisher>,
}

impl OrderService {
    /// Create a coordinator over the given components.
    #[must_use]
    pub fn new(
        cache: Arc<OrderCache>,
        store: Arc<dyn OrderStore>,
        publisher: Arc<dyn OrderPublisher>,
    ) -> Self {
        Self {
            inner: Arc::new(OrderServiceInner {
                cache,
                store,
                publisher,
            }),
        }
    }

    /// The shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<OrderCache> {
        &self.inner.cache
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.inner.store
    }

    /// Validate a submission and queue it unchanged.
    ///
    /// Nothing is sent to the queue when validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a malformed or incomplete
    /// document and `ServiceError::Transport` if the queue rejects the write.
    #[instrument(skip_all, fields(bytes = body.len()))]
    pub async fn ingest(&self, body: Bytes) -> Result<OrderUid, ServiceError> {
        let submission = validate_submission(&body)?;

        self.inner.publisher.publish(&body).await?;

        info!(order_uid = %submission.order_uid, "Order queued");
        Ok(submission.order_uid)
    }

    /// Fetch an order document, from the cache if possible.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a blank id,
    /// `ServiceError::NotFound` if the order does not exist and
    /// `ServiceError::Persistence` if the store fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Bytes, ServiceError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ValidationError::MissingField("order_uid".to_owned()).into());
        }

        if let Some(document) = self.inner.cache.get(id) {
            debug!("Cache hit");
            return Ok(document);
        }

        // Ids the store could never hold are simply unknown.
        let Ok(order_uid) = OrderUid::parse(id) else {
            return Err(ServiceError::NotFound(id.to_owned()));
        };

        let document = match self.inner.store.get_raw(order_uid.as_str()).await {
            Ok(document) => document,
            Err(RepositoryError::NotFound) => {
                return Err(ServiceError::NotFound(order_uid.into_inner()));
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Cache miss served from store");
        // A write consumed while the read was in flight is newer than `document`.
        self.inner.cache.set_if_absent(order_uid, document.clone());
        Ok(document)
    }

    /// Load up to `limit` of the most recently updated orders into the cache.
    ///
    /// Newer orders end up as more recently used. Returns the number of
    /// documents loaded.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Timeout` if the store does not answer within
    /// `deadline` and `ServiceError::Persistence` if it fails.
    #[instrument(skip(self))]
    pub async fn warm(&self, limit: usize, deadline: Duration) -> Result<usize, ServiceError> {
        let mut recent = tokio::time::timeout(deadline, self.inner.store.load_recent(limit))
            .await
            .map_err(|_| ServiceError::Timeout(deadline))??;

        recent.reverse();
        let loaded = self.inner.cache.bulk_load(recent);

        info!(loaded, "Cache warmed");
        Ok(loaded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::db::{InMemoryOrderStore, OrderDocument};
    use crate::queue::{ChannelSource, FailingPublisher, MessageSource, OrderConsumer, channel};

    /// Holds every `get_raw` result until released.
    struct GatedStore {
        inner: Arc<InMemoryOrderStore>,
        read: Notify,
        release: Notify,
    }

    #[async_trait]
    impl OrderStore for GatedStore {
        async fn upsert(&self, document: &OrderDocument) -> Result<(), RepositoryError> {
            self.inner.upsert(document).await
        }

        async fn get_raw(&self, order_uid: &str) -> Result<Bytes, RepositoryError> {
            let result = self.inner.get_raw(order_uid).await;
            self.read.notify_one();
            self.release.notified().await;
            result
        }

        async fn load_recent(
            &self,
            limit: usize,
        ) -> Result<Vec<(OrderUid, Bytes)>, RepositoryError> {
            self.inner.load_recent(limit).await
        }
    }

    /// Answers `load_recent` only after `delay`.
    struct SlowStore {
        delay: Duration,
    }

    #[async_trait]
    impl OrderStore for SlowStore {
        async fn upsert(&self, _document: &OrderDocument) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn get_raw(&self, _order_uid: &str) -> Result<Bytes, RepositoryError> {
            Err(RepositoryError::NotFound)
        }

        async fn load_recent(
            &self,
            _limit: usize,
        ) -> Result<Vec<(OrderUid, Bytes)>, RepositoryError> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![(uid("late"), Bytes::from_static(b"late"))])
        }
    }

    const MINIMAL: &[u8] = br#"{"order_uid":"o1","track_number":"T1","payment":{"transaction":"tx1"},"delivery":{"name":"A","address":"B"}}"#;

    fn uid(id: &str) -> OrderUid {
        OrderUid::parse(id).unwrap()
    }

    fn service_with(
        store: Arc<InMemoryOrderStore>,
        capacity: usize,
    ) -> (OrderService, ChannelSource) {
        let (publisher, source) = channel(8);
        let service = OrderService::new(
            Arc::new(OrderCache::new(capacity)),
            store,
            Arc::new(publisher),
        );
        (service, source)
    }

    #[tokio::test]
    async fn test_ingest_queues_raw_bytes() {
        let (service, mut source) = service_with(Arc::new(InMemoryOrderStore::new()), 4);

        let order_uid = service.ingest(Bytes::from_static(MINIMAL)).await.unwrap();

        assert_eq!(order_uid.as_str(), "o1");
        assert_eq!(source.recv().await.unwrap(), Bytes::from_static(MINIMAL));
    }

    #[tokio::test]
    async fn test_ingest_rejects_before_publish() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (publisher, _source) = channel(8);
        let service = OrderService::new(
            Arc::new(OrderCache::new(4)),
            store,
            Arc::new(publisher.clone()),
        );

        let err = service
            .ingest(Bytes::from_static(br#"{"order_uid":"o1"}"#))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::MissingField(ref f)) if f == "track_number"
        ));
        assert_eq!(publisher.published(), 0);
    }

    #[tokio::test]
    async fn test_ingest_transport_failure() {
        let service = OrderService::new(
            Arc::new(OrderCache::new(4)),
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(FailingPublisher),
        );

        let err = service.ingest(Bytes::from_static(MINIMAL)).await.unwrap_err();

        assert!(matches!(err, ServiceError::Transport(_)));
    }

    #[tokio::test]
    async fn test_get_populates_cache_on_miss() {
        let store = Arc::new(InMemoryOrderStore::with_documents([(
            uid("o1"),
            Bytes::from_static(MINIMAL),
        )]));
        let (service, _source) = service_with(Arc::clone(&store), 4);

        assert_eq!(service.get("o1").await.unwrap(), Bytes::from_static(MINIMAL));
        assert_eq!(store.get_calls(), 1);

        assert_eq!(service.get("o1").await.unwrap(), Bytes::from_static(MINIMAL));
        assert_eq!(store.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_leaves_cache_untouched() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (service, _source) = service_with(Arc::clone(&store), 4);

        let err = service.get("unknown").await.unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(ref id) if id == "unknown"));
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_get_blank_id_is_validation_error() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (service, _source) = service_with(Arc::clone(&store), 4);

        let err = service.get("  ").await.unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_store_failure() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.fail_reads(true);
        let (service, _source) = service_with(Arc::clone(&store), 4);

        let err = service.get("o1").await.unwrap_err();

        assert!(matches!(err, ServiceError::Persistence(_)));
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_warm_serves_without_store_access() {
        let store = Arc::new(InMemoryOrderStore::with_documents(
            ["a", "b", "c"].map(|id| (uid(id), Bytes::from(id))),
        ));
        let (service, _source) = service_with(Arc::clone(&store), 3);

        let loaded = service.warm(3, Duration::from_secs(1)).await.unwrap();

        assert_eq!(loaded, 3);
        for id in ["a", "b", "c"] {
            assert_eq!(service.get(id).await.unwrap(), Bytes::from(id));
        }
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_warm_newest_is_most_recent() {
        let store = Arc::new(InMemoryOrderStore::with_documents(
            ["a", "b"].map(|id| (uid(id), Bytes::from(id))),
        ));
        let (service, _source) = service_with(Arc::clone(&store), 2);
        service.warm(2, Duration::from_secs(1)).await.unwrap();

        // "a" is the older order, so it is evicted first.
        service.cache().set(uid("c"), Bytes::from_static(b"c"));

        assert!(!service.cache().contains("a"));
        assert!(service.cache().contains("b"));
    }

    #[tokio::test]
    async fn test_warm_store_failure_leaves_cache_empty() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.fail_reads(true);
        let (service, _source) = service_with(Arc::clone(&store), 2);

        let err = service.warm(2, Duration::from_secs(1)).await.unwrap_err();

        assert!(matches!(err, ServiceError::Persistence(_)));
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_get_miss_does_not_overwrite_newer_consumed_write() {
        let v1 = Bytes::from_static(br#"{"order_uid":"o1","v":1}"#);
        let v2 = Bytes::from_static(br#"{"order_uid":"o1","v":2}"#);
        let inner = Arc::new(InMemoryOrderStore::with_documents([(uid("o1"), v1.clone())]));
        let store = Arc::new(GatedStore {
            inner: Arc::clone(&inner),
            read: Notify::new(),
            release: Notify::new(),
        });
        let (publisher, _source) = channel(8);
        let service = OrderService::new(
            Arc::new(OrderCache::new(4)),
            store.clone(),
            Arc::new(publisher),
        );

        let reader = tokio::spawn({
            let service = service.clone();
            async move { service.get("o1").await }
        });
        store.read.notified().await;

        let cache = Arc::clone(service.cache());
        let consumer = OrderConsumer::new(inner.clone()).on_persisted(move |order_uid, raw| {
            cache.set(order_uid.clone(), raw);
        });
        consumer.process(v2.clone()).await;

        store.release.notify_one();
        assert_eq!(reader.await.unwrap().unwrap(), v1);

        assert_eq!(inner.payload("o1").unwrap(), v2);
        assert_eq!(service.cache().get("o1").unwrap(), v2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_deadline_leaves_cache_empty() {
        let (publisher, _source) = channel(8);
        let service = OrderService::new(
            Arc::new(OrderCache::new(4)),
            Arc::new(SlowStore {
                delay: Duration::from_secs(30),
            }),
            Arc::new(publisher),
        );

        let err = service.warm(4, Duration::from_secs(5)).await.unwrap_err();

        assert!(matches!(err, ServiceError::Timeout(d) if d == Duration::from_secs(5)));
        assert!(service.cache().is_empty());
    }
}
