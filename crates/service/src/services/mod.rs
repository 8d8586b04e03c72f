//! Business logic services.
//!
//! # Services
//!
//! - `orders` - Order ingest, cache-aside reads and cache warm-up

pub mod orders;

pub use orders::{OrderService, ServiceError};
