//! Orderflow order service library.
//!
//! Ingests order documents over HTTP into a Kafka topic, persists consumed
//! documents to `PostgreSQL` and serves point reads through a bounded
//! in-process cache. Exposed as a library so the binary, the CLI and the
//! integration tests share one implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod queue;
pub mod routes;
pub mod services;
pub mod state;
