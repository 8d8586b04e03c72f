//! Order document model.
//!
//! An [`Order`] owns exactly one [`Delivery`], exactly one [`Payment`] and an
//! ordered list of [`Item`]s. Field names follow the wire format of the
//! submitted JSON document so the model deserializes directly from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ChrtId, OrderUid, TransactionId};

/// A complete order document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: OrderUid,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    #[serde(default)]
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Delivery recipient details. One per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Payment details. One per order, keyed by `transaction`.
///
/// Monetary amounts are integer minor units as sent by the upstream system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: TransactionId,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix timestamp (seconds).
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// A single line item, keyed by `chrt_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: ChrtId,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl Order {
    /// Try to read a full order from a JSON value.
    ///
    /// Returns `None` when the document does not satisfy the complete schema;
    /// such documents can still be stored as raw payload.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }

    /// Sum of all item total prices.
    #[must_use]
    pub fn items_total(&self) -> i64 {
        self.items.iter().map(|item| item.total_price).sum()
    }
}
