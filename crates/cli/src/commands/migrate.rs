//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! orderflow-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `POSTGRES_DSN` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! `crates/service/migrations/`:
//! ```text
//! migrations/
//! └── 20260101000001_create_orders.sql
//! ```

use orderflow_service::config::{ConfigError, ServiceConfig};
use orderflow_service::db;
use thiserror::Error;

/// Errors that can occur while applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Environment could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply all pending migrations to the orders database.
pub async fn run() -> Result<(), MigrationError> {
    let config = ServiceConfig::from_env()?;

    tracing::info!("Connecting to orders database...");
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running orders migrations...");
    sqlx::migrate!("../service/migrations").run(&pool).await?;

    tracing::info!("Orders migrations complete!");
    Ok(())
}
