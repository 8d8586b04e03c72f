//! Show what the service's startup warm-up would load.
//!
//! # Usage
//!
//! ```bash
//! orderflow-cli warm-check
//! ```
//!
//! Prints one line per document in cache insertion order (oldest first), so
//! the last line is the entry the cache treats as most recently used.

use orderflow_service::config::{ConfigError, ServiceConfig};
use orderflow_service::db::{self, OrderStore, PgOrderStore, RepositoryError};
use thiserror::Error;

/// Errors that can occur during the warm-up check.
#[derive(Debug, Error)]
pub enum WarmCheckError {
    /// Environment could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    /// Query failed.
    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),
}

/// Fetch the warm-up rows and print them.
pub async fn run() -> Result<(), WarmCheckError> {
    let config = ServiceConfig::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;
    let store = PgOrderStore::new(pool);

    let limit = config.cache.warm_rows();
    let mut recent = store.load_recent(limit).await?;
    recent.reverse();

    #[allow(clippy::print_stdout)]
    {
        for (order_uid, raw) in &recent {
            println!("{order_uid}\t{} bytes", raw.len());
        }
        println!(
            "{} of at most {limit} documents (cache capacity {})",
            recent.len(),
            config.cache.capacity
        );
    }
    Ok(())
}
