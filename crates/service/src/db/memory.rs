//! In-memory order store for tests.
//!
//! Mirrors the table layout and upsert rules of [`super::PgOrderStore`] so
//! idempotency can be checked without a database, and counts calls so tests
//! can assert whether a read reached the store at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use orderflow_core::{ChrtId, Delivery, Item, OrderUid, Payment, TransactionId};

use super::{OrderDocument, OrderStore, RepositoryError};

/// Store backed by hash maps, one per table.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    tables: Mutex<Tables>,
    upserts: AtomicUsize,
    reads: AtomicUsize,
    recent_loads: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

#[derive(Debug, Default)]
struct Tables {
    clock: u64,
    orders: HashMap<OrderUid, OrderRow>,
    deliveries: HashMap<OrderUid, Delivery>,
    payments: HashMap<TransactionId, (OrderUid, Payment)>,
    items: HashMap<ChrtId, (OrderUid, Item)>,
}

#[derive(Debug, Clone)]
struct OrderRow {
    payload: Bytes,
    track_number: Option<String>,
    updated_at: u64,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw documents, oldest first.
    #[must_use]
    pub fn with_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (OrderUid, Bytes)>,
    {
        let store = Self::new();
        {
            let mut tables = store.lock();
            for (order_uid, raw) in documents {
                tables.write(&OrderDocument::raw_only(order_uid, raw));
            }
        }
        store
    }

    /// Make every subsequent `upsert` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `get_raw`, `load_recent` and `ping` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `upsert` calls, successful or not.
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Number of `get_raw` calls, successful or not.
    pub fn get_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `load_recent` calls.
    pub fn load_recent_calls(&self) -> usize {
        self.recent_loads.load(Ordering::SeqCst)
    }

    /// Row counts as `(orders, deliveries, payments, items)`.
    pub fn row_counts(&self) -> (usize, usize, usize, usize) {
        let tables = self.lock();
        (
            tables.orders.len(),
            tables.deliveries.len(),
            tables.payments.len(),
            tables.items.len(),
        )
    }

    /// Stored delivery of an order.
    pub fn delivery(&self, order_uid: &str) -> Option<Delivery> {
        self.lock().deliveries.get(order_uid).cloned()
    }

    /// Stored payment of an order.
    pub fn payment_of(&self, order_uid: &str) -> Option<Payment> {
        self.lock()
            .payments
            .values()
            .find(|(owner, _)| owner.as_str() == order_uid)
            .map(|(_, payment)| payment.clone())
    }

    /// Stored item by `chrt_id`, with its owning order.
    pub fn item(&self, chrt_id: ChrtId) -> Option<(OrderUid, Item)> {
        self.lock().items.get(&chrt_id).cloned()
    }

    /// Stored raw payload of an order, without counting as a read.
    pub fn payload(&self, order_uid: &str) -> Option<Bytes> {
        self.lock()
            .orders
            .get(order_uid)
            .map(|row| row.payload.clone())
    }

    /// Stored header track number of an order.
    pub fn track_number(&self, order_uid: &str) -> Option<String> {
        self.lock()
            .orders
            .get(order_uid)
            .and_then(|row| row.track_number.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_reads(&self) -> Result<(), RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }
}

impl Tables {
    /// Reject a payment whose transaction id belongs to another order.
    fn check(&self, document: &OrderDocument) -> Result<(), RepositoryError> {
        let Some(order) = &document.order else {
            return Ok(());
        };
        match self.payments.get(&order.payment.transaction) {
            Some((owner, _)) if owner != &order.order_uid => Err(RepositoryError::Conflict(
                format!("payment {} belongs to another order", order.payment.transaction),
            )),
            _ => Ok(()),
        }
    }

    fn write(&mut self, document: &OrderDocument) {
        self.clock += 1;
        let updated_at = self.clock;

        let track_number = match &document.order {
            Some(order) => Some(order.track_number.clone()),
            None => self
                .orders
                .get(&document.order_uid)
                .and_then(|row| row.track_number.clone()),
        };
        self.orders.insert(
            document.order_uid.clone(),
            OrderRow {
                payload: document.raw.clone(),
                track_number,
                updated_at,
            },
        );

        let Some(order) = &document.order else {
            return;
        };

        self.deliveries
            .insert(order.order_uid.clone(), order.delivery.clone());

        self.payments.retain(|transaction, (owner, _)| {
            owner != &order.order_uid || transaction == &order.payment.transaction
        });
        self.payments.insert(
            order.payment.transaction.clone(),
            (order.order_uid.clone(), order.payment.clone()),
        );

        for item in &order.items {
            self.items
                .insert(item.chrt_id, (order.order_uid.clone(), item.clone()));
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn upsert(&self, document: &OrderDocument) -> Result<(), RepositoryError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("writes disabled".to_string()));
        }
        let mut tables = self.lock();
        tables.check(document)?;
        tables.write(document);
        Ok(())
    }

    async fn get_raw(&self, order_uid: &str) -> Result<Bytes, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        self.lock()
            .orders
            .get(order_uid)
            .map(|row| row.payload.clone())
            .ok_or(RepositoryError::NotFound)
    }

    async fn load_recent(&self, limit: usize) -> Result<Vec<(OrderUid, Bytes)>, RepositoryError> {
        self.recent_loads.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        let tables = self.lock();
        let mut rows: Vec<_> = tables.orders.iter().collect();
        rows.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|(order_uid, row)| (order_uid.clone(), row.payload.clone()))
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.check_reads()
    }
}
