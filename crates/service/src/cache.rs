//! Bounded in-memory order cache.
//!
//! Maps `order_uid` to the document bytes last known for it. The store is
//! authoritative; the cache is a derived view populated on warm-up, on
//! consumed writes and on read misses.
//!
//! # Eviction
//!
//! When full, inserting a new key evicts the least-recently-used entry.
//! Every `get` and `set` stamps the entry with a monotonically increasing
//! tick. Stamps are atomics so `get` only needs the read lock and concurrent
//! readers never block each other; writers take the write lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use orderflow_core::OrderUid;

/// Fixed-capacity order document cache with LRU eviction.
#[derive(Debug)]
pub struct OrderCache {
    /// Maximum number of entries; 0 disables the bound.
    capacity: usize,
    entries: RwLock<HashMap<OrderUid, Entry>>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug)]
struct Entry {
    document: Bytes,
    last_used: AtomicU64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub len: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl OrderCache {
    /// Create a cache holding at most `capacity` documents.
    ///
    /// A capacity of 0 creates an unbounded cache.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a document, marking it as most recently used.
    pub fn get(&self, id: &str) -> Option<Bytes> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(id) {
            entry.last_used.store(self.tick(), Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.document.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert or overwrite a document.
    ///
    /// Inserting a new key into a full cache evicts exactly one entry, the
    /// least recently used one.
    pub fn set(&self, id: OrderUid, document: Bytes) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get_mut(&id) {
            entry.document = document;
            *entry.last_used.get_mut() = self.tick();
            return;
        }

        self.insert_evicting(&mut entries, id, document);
    }

    /// Insert a document only if the key is not cached yet.
    ///
    /// An existing entry is left as is, recency included. Eviction follows
    /// the same rule as [`OrderCache::set`]. Returns `true` if the document
    /// was inserted.
    pub fn set_if_absent(&self, id: OrderUid, document: Bytes) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&id) {
            return false;
        }
        self.insert_evicting(&mut entries, id, document);
        true
    }

    /// Load a batch of documents without evicting anything.
    ///
    /// Entries are inserted in iteration order, so later entries count as
    /// more recently used. Existing keys are overwritten in place. Loading
    /// stops at the first new key that would exceed the capacity.
    ///
    /// Returns the number of documents written.
    pub fn bulk_load<I>(&self, documents: I) -> usize
    where
        I: IntoIterator<Item = (OrderUid, Bytes)>,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut loaded = 0;

        for (id, document) in documents {
            if let Some(entry) = entries.get_mut(&id) {
                entry.document = document;
                *entry.last_used.get_mut() = self.tick();
            } else if self.is_full(entries.len()) {
                break;
            } else {
                entries.insert(id, self.entry(document));
            }
            loaded += 1;
        }

        loaded
    }

    /// Returns `true` if the document is cached, without touching recency.
    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity; 0 means unbounded.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of size and hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn insert_evicting(
        &self,
        entries: &mut HashMap<OrderUid, Entry>,
        id: OrderUid,
        document: Bytes,
    ) {
        if self.is_full(entries.len()) {
            let victim = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                entries.remove(&victim);
                tracing::trace!(order_uid = %victim, "evicted from cache");
            }
        }

        entries.insert(id, self.entry(document));
    }

    const fn is_full(&self, len: usize) -> bool {
        self.capacity > 0 && len >= self.capacity
    }

    fn entry(&self, document: Bytes) -> Entry {
        Entry {
            document,
            last_used: AtomicU64::new(self.tick()),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn uid(s: &str) -> OrderUid {
        OrderUid::parse(s).unwrap()
    }

    fn doc(s: &str) -> Bytes {
        Bytes::from(format!(r#"{{"order_uid":"{s}"}}"#))
    }

    #[test]
    fn test_set_then_get_round_trips_bytes() {
        let cache = OrderCache::new(2);
        let sample = Bytes::from_static(br#"{"order_uid":"a1",  "x": [1, 2]}"#);
        cache.set(uid("a1"), sample.clone());
        assert_eq!(cache.get("a1").unwrap(), sample);
    }

    #[test]
    fn test_get_missing() {
        let cache = OrderCache::new(2);
        assert!(cache.get("nope").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_overwrite_existing_key_does_not_evict() {
        let cache = OrderCache::new(2);
        cache.set(uid("a"), doc("a"));
        cache.set(uid("b"), doc("b"));
        cache.set(uid("a"), Bytes::from_static(b"updated"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap(), Bytes::from_static(b"updated"));
        assert!(cache.contains("b"));
    }

    #[test]
    fn test_overflow_evicts_least_recently_inserted() {
        let cache = OrderCache::new(3);
        for id in ["a", "b", "c", "d"] {
            cache.set(uid(id), doc(id));
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b") && cache.contains("c") && cache.contains("d"));
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = OrderCache::new(3);
        for id in ["a", "b", "c"] {
            cache.set(uid(id), doc(id));
        }
        cache.get("a");
        cache.set(uid("d"), doc("d"));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_overwrite_refreshes_recency() {
        let cache = OrderCache::new(2);
        cache.set(uid("a"), doc("a"));
        cache.set(uid("b"), doc("b"));
        cache.set(uid("a"), doc("a"));
        cache.set(uid("c"), doc("c"));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_set_if_absent_keeps_existing_document() {
        let cache = OrderCache::new(2);
        cache.set(uid("a"), Bytes::from_static(b"new"));

        assert!(!cache.set_if_absent(uid("a"), Bytes::from_static(b"old")));
        assert_eq!(cache.get("a").unwrap(), Bytes::from_static(b"new"));
    }

    #[test]
    fn test_set_if_absent_evicts_when_full() {
        let cache = OrderCache::new(2);
        cache.set(uid("a"), doc("a"));
        cache.set(uid("b"), doc("b"));

        assert!(cache.set_if_absent(uid("c"), doc("c")));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let cache = OrderCache::new(0);
        for i in 0..500 {
            let id = format!("o{i}");
            cache.set(uid(&id), doc(&id));
        }
        assert_eq!(cache.len(), 500);
    }

    #[test]
    fn test_bulk_load_stops_when_full() {
        let cache = OrderCache::new(3);
        cache.set(uid("existing"), doc("existing"));

        let batch = ["a", "b", "c", "d"].map(|id| (uid(id), doc(id)));
        let loaded = cache.bulk_load(batch);

        assert_eq!(loaded, 2);
        assert_eq!(cache.len(), 3);
        assert!(cache.contains("existing"));
        assert!(cache.contains("a") && cache.contains("b"));
        assert!(!cache.contains("c") && !cache.contains("d"));
    }

    #[test]
    fn test_bulk_load_overwrites_existing_when_full() {
        let cache = OrderCache::new(2);
        cache.set(uid("a"), doc("a"));
        cache.set(uid("b"), doc("b"));

        let loaded = cache.bulk_load([(uid("b"), Bytes::from_static(b"fresh"))]);

        assert_eq!(loaded, 1);
        assert_eq!(cache.get("b").unwrap(), Bytes::from_static(b"fresh"));
    }

    #[test]
    fn test_bulk_load_order_sets_recency() {
        let cache = OrderCache::new(2);
        cache.bulk_load([(uid("old"), doc("old")), (uid("new"), doc("new"))]);
        cache.set(uid("x"), doc("x"));
        assert!(!cache.contains("old"));
        assert!(cache.contains("new"));
    }

    #[test]
    fn test_concurrent_access_respects_capacity() {
        let cache = Arc::new(OrderCache::new(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("t{t}-{i}");
                        cache.set(uid(&id), doc(&id));
                        cache.get(&id);
                        cache.get("t0-0");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }
}
