//! Consume loop: queue → store → cache.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use orderflow_core::{OrderUid, extract_order_uid};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{MessageSource, QueueError};
use crate::db::{OrderDocument, OrderStore};

/// Callback invoked after a document was durably persisted.
pub type PersistedHook = Arc<dyn Fn(&OrderUid, Bytes) + Send + Sync>;

/// Why a message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InvalidJson,
    MissingOrderUid,
    PersistenceFailed,
}

impl SkipReason {
    /// Stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::MissingOrderUid => "missing_order_uid",
            Self::PersistenceFailed => "persistence_failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Persisted(OrderUid),
    Skipped(SkipReason),
}

/// Reads order documents from a [`MessageSource`] and persists them.
///
/// Messages are handled strictly one at a time in delivery order.
#[derive(Clone)]
pub struct OrderConsumer {
    store: Arc<dyn OrderStore>,
    on_persisted: Option<PersistedHook>,
}

impl OrderConsumer {
    /// Create a consumer writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            on_persisted: None,
        }
    }

    /// Register the callback run after each successful write.
    #[must_use]
    pub fn on_persisted<F>(mut self, hook: F) -> Self
    where
        F: Fn(&OrderUid, Bytes) + Send + Sync + 'static,
    {
        self.on_persisted = Some(Arc::new(hook));
        self
    }

    /// Run the receive loop until the source fails or `cancel` fires.
    ///
    /// Bad messages and failed writes never stop the loop. The returned
    /// error is the one that ended it; [`QueueError::Cancelled`] means the
    /// owner asked it to stop.
    pub async fn run<S>(&self, source: &mut S, cancel: &CancellationToken) -> QueueError
    where
        S: MessageSource + ?Sized,
    {
        info!("Order consumer started");
        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(QueueError::Cancelled),
                received = source.recv() => received,
            };

            match received {
                Ok(payload) => {
                    self.process(payload).await;
                }
                Err(err) => {
                    info!(error = %err, "Order consumer stopped");
                    return err;
                }
            }
        }
    }

    /// Handle a single message payload.
    pub async fn process(&self, payload: Bytes) -> ProcessOutcome {
        let value: serde_json::Value = match serde_json::from_slice(&payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(reason = %SkipReason::InvalidJson, error = %e, "Skipping message");
                return ProcessOutcome::Skipped(SkipReason::InvalidJson);
            }
        };

        let Some(order_uid) = extract_order_uid(&value) else {
            warn!(reason = %SkipReason::MissingOrderUid, "Skipping message");
            return ProcessOutcome::Skipped(SkipReason::MissingOrderUid);
        };

        let document = OrderDocument::new(order_uid.clone(), payload, &value);
        if let Err(e) = self.store.upsert(&document).await {
            warn!(
                reason = %SkipReason::PersistenceFailed,
                order_uid = %order_uid,
                error = %e,
                "Skipping message"
            );
            return ProcessOutcome::Skipped(SkipReason::PersistenceFailed);
        }

        debug!(
            order_uid = %order_uid,
            normalized = document.is_normalized(),
            "Order persisted"
        );

        if let Some(hook) = &self.on_persisted {
            hook(&order_uid, document.raw);
        }

        ProcessOutcome::Persisted(order_uid)
    }
}
