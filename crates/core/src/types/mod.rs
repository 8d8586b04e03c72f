//! Core types for Orderflow.
//!
//! This module provides the order document model and type-safe wrappers
//! for its natural keys.

pub mod id;
pub mod order;
pub mod validation;

pub use id::*;
pub use order::{Delivery, Item, Order, Payment};
pub use validation::{Submission, ValidationError, extract_order_uid, validate_submission};
