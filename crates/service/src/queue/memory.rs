//! In-process queue for tests.
//!
//! [`channel`] returns a publisher/source pair connected by a tokio mpsc
//! channel, so the whole ingest → consume → persist pipeline can run inside
//! one test without a broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{MessageSource, OrderPublisher, QueueError};

/// Create a connected publisher and source with room for `capacity` messages.
#[must_use]
pub fn channel(capacity: usize) -> (ChannelPublisher, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ChannelPublisher {
            tx,
            published: Arc::new(AtomicUsize::new(0)),
        },
        ChannelSource { rx },
    )
}

/// Sending half of [`channel`].
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<Bytes>,
    published: Arc<AtomicUsize>,
}

impl ChannelPublisher {
    /// Enqueue a raw payload without going through validation.
    ///
    /// Payloads that do not fit are dropped.
    pub fn push(&self, payload: Bytes) {
        if self.tx.try_send(payload).is_ok() {
            self.published.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Number of messages accepted so far.
    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderPublisher for ChannelPublisher {
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        self.tx
            .send(Bytes::copy_from_slice(payload))
            .await
            .map_err(|_| QueueError::Closed)?;
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Receiving half of [`channel`]. Fails with [`QueueError::Closed`] once
/// every publisher is dropped and the buffer is drained.
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn recv(&mut self) -> Result<Bytes, QueueError> {
        self.rx.recv().await.ok_or(QueueError::Closed)
    }
}

/// Publisher whose broker is always unreachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingPublisher;

#[async_trait]
impl OrderPublisher for FailingPublisher {
    async fn publish(&self, _payload: &[u8]) -> Result<(), QueueError> {
        Err(QueueError::Unavailable("broker unreachable".to_string()))
    }
}
