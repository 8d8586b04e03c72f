//! Coordinator error types.

use std::time::Duration;

use orderflow_core::ValidationError;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::queue::QueueError;

/// Errors that can occur while ingesting, reading or warming orders.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The submission or the requested id is malformed.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No order with this id exists.
    #[error("order not found: {0}")]
    NotFound(String),

    /// The queue did not accept the write.
    #[error("queue error: {0}")]
    Transport(#[from] QueueError),

    /// The store failed.
    #[error("store error: {0}")]
    Persistence(#[from] RepositoryError),

    /// The operation did not finish before its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

