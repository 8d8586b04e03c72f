//! Publish order documents from files.
//!
//! Every file is checked with the same validator as `POST /ingest` and sent
//! to the topic byte-for-byte.
//!
//! # Usage
//!
//! ```bash
//! orderflow-cli publish model.json more/*.json
//! ```
//!
//! # Environment Variables
//!
//! - `KAFKA_BROKERS`, `KAFKA_TOPIC`, `KAFKA_PRODUCE_TIMEOUT_MS`

use std::path::{Path, PathBuf};

use orderflow_core::{ValidationError, validate_submission};
use orderflow_service::config::{ConfigError, KafkaConfig};
use orderflow_service::queue::{KafkaPublisher, OrderPublisher, QueueError};
use thiserror::Error;

/// Errors that can occur while publishing documents.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Environment could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Producer could not be created or the broker is unreachable.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// A file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A file is not a valid order document.
    #[error("{path}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },

    /// Some files failed; the rest were published.
    #[error("{failed} of {total} documents failed")]
    Partial { failed: usize, total: usize },
}

/// Validate and publish each file, continuing past failures.
pub async fn run(files: &[PathBuf]) -> Result<(), PublishError> {
    let config = KafkaConfig::from_env()?;
    let publisher = KafkaPublisher::new(&config)?;
    publisher.check_connectivity().await?;

    let mut failed = 0;
    for path in files {
        match publish_file(&publisher, path).await {
            Ok(order_uid) => tracing::info!(path = %path.display(), %order_uid, "Published"),
            Err(e) => {
                tracing::error!(error = %e, "Publish failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(PublishError::Partial {
            failed,
            total: files.len(),
        });
    }
    Ok(())
}

async fn publish_file(
    publisher: &dyn OrderPublisher,
    path: &Path,
) -> Result<String, PublishError> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|source| PublishError::Read {
            path: path.to_owned(),
            source,
        })?;

    let submission = validate_submission(&body).map_err(|source| PublishError::Invalid {
        path: path.to_owned(),
        source,
    })?;

    publisher.publish(&body).await?;
    Ok(submission.order_uid.into_inner())
}
