//! Ingestion channel between the HTTP write path and persistence.
//!
//! Submissions are published as raw JSON bytes to one topic; a single
//! consumer loop reads them back one at a time, persists them and refreshes
//! the cache.
//!
//! # Delivery
//!
//! At-least-once. Offsets are committed by the broker client, so a message
//! may be redelivered after a crash; persistence is an idempotent upsert.
//! A message that fails to persist is logged and skipped, not retried here.

pub mod consumer;
pub mod kafka;
#[cfg(any(test, feature = "testkit"))]
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use consumer::{OrderConsumer, ProcessOutcome, SkipReason};
pub use kafka::{KafkaPublisher, KafkaSource};
#[cfg(any(test, feature = "testkit"))]
pub use memory::{ChannelPublisher, ChannelSource, FailingPublisher, channel};

/// Errors raised by the message queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Error reported by the Kafka client.
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The broker could not be reached or refused the operation.
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// The underlying channel was closed.
    #[error("queue closed")]
    Closed,

    /// The receive loop was cancelled by its owner.
    #[error("consumer cancelled")]
    Cancelled,
}

/// Publishes order documents to the queue.
#[async_trait]
pub trait OrderPublisher: Send + Sync {
    /// Publish one document.
    ///
    /// Resolves once the broker acknowledged the write.
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError>;
}

/// Blocking receive side of the queue.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message payload.
    ///
    /// An error ends the consume loop.
    async fn recv(&mut self) -> Result<Bytes, QueueError>;
}
