//! Order persistence.
//!
//! # Database: `orders`
//!
//! ## Tables
//!
//! - `orders` - Order header plus the raw submitted document (`payload`)
//! - `deliveries` - One row per order, keyed by `order_uid`
//! - `payments` - One row per order, keyed by `transaction`
//! - `items` - Line items, keyed by `chrt_id`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/service/migrations/` and run via:
//! ```bash
//! cargo run -p orderflow-cli -- migrate
//! ```
//!
//! The coordinator and the queue consumer only see the [`OrderStore`] trait.
//! [`PgOrderStore`] is the production implementation; the `testkit` feature
//! adds an in-memory one.

#[cfg(any(test, feature = "testkit"))]
pub mod memory;
pub mod orders;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use orderflow_core::{Order, OrderUid};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

#[cfg(any(test, feature = "testkit"))]
pub use memory::InMemoryOrderStore;
pub use orders::PgOrderStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// The write would move a row owned by another order.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store refused the write for a reason other than the database.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// A document ready to be persisted.
///
/// `raw` is always written. When the document satisfies the full order
/// schema, `order` carries the parsed form and the normalized tables are
/// written in the same transaction.
#[derive(Debug, Clone)]
pub struct OrderDocument {
    pub order_uid: OrderUid,
    pub raw: Bytes,
    pub order: Option<Order>,
}

impl OrderDocument {
    /// Build a document from raw bytes and the JSON value parsed from them.
    #[must_use]
    pub fn new(order_uid: OrderUid, raw: Bytes, value: &serde_json::Value) -> Self {
        let order = Order::from_value(value).filter(|order| order.order_uid == order_uid);
        Self {
            order_uid,
            raw,
            order,
        }
    }

    /// A payload-only document; only the `orders` row is written.
    #[must_use]
    pub const fn raw_only(order_uid: OrderUid, raw: Bytes) -> Self {
        Self {
            order_uid,
            raw,
            order: None,
        }
    }

    /// Returns `true` if the normalized tables will be written.
    #[must_use]
    pub const fn is_normalized(&self) -> bool {
        self.order.is_some()
    }
}

/// Storage capability used by the coordinator and the queue consumer.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert or update an order atomically, keyed on its natural keys.
    ///
    /// Repeating the call with the same `order_uid` updates in place. A
    /// payment whose `transaction` already belongs to another order is
    /// rejected with [`RepositoryError::Conflict`] and nothing is written.
    async fn upsert(&self, document: &OrderDocument) -> Result<(), RepositoryError>;

    /// Fetch the raw document for an order.
    ///
    /// Returns [`RepositoryError::NotFound`] when the order does not exist.
    async fn get_raw(&self, order_uid: &str) -> Result<Bytes, RepositoryError>;

    /// Fetch up to `limit` documents, most recently updated first.
    async fn load_recent(&self, limit: usize) -> Result<Vec<(OrderUid, Bytes)>, RepositoryError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_document_new_partial_is_raw_only() {
        let raw = Bytes::from_static(br#"{"order_uid":"o1"}"#);
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        let doc = OrderDocument::new(OrderUid::parse("o1").unwrap(), raw, &value);
        assert!(!doc.is_normalized());
    }

    #[test]
    fn test_repository_error_display() {
        assert_eq!(RepositoryError::NotFound.to_string(), "not found");
        assert_eq!(
            RepositoryError::Conflict("tx1 belongs to o1".to_string()).to_string(),
            "conflict: tx1 belongs to o1"
        );
        assert_eq!(
            RepositoryError::DataCorruption("bad payload".to_string()).to_string(),
            "data corruption: bad payload"
        );
    }
}
