//! Orderflow Core - Shared order types.
//!
//! This crate provides the types used across all Orderflow components:
//! - `service` - HTTP ingest/read service and the queue consumer
//! - `cli` - Command-line tools for migrations and publishing
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no queue clients. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Order document model, typed identifiers and submission validation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
