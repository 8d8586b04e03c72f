//! `PostgreSQL` order repository.
//!
//! Runtime queries (`sqlx::query`) are used throughout so the crate builds
//! without a live database or offline query data.

use async_trait::async_trait;
use bytes::Bytes;
use orderflow_core::{Delivery, Item, Order, OrderUid, Payment};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use super::{OrderDocument, OrderStore, RepositoryError};

/// Order store backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a new order store on an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip_all, fields(order_uid = %document.order_uid, normalized = document.is_normalized()))]
    async fn upsert(&self, document: &OrderDocument) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        match &document.order {
            Some(order) => {
                upsert_header(&mut tx, order, &document.raw).await?;
                upsert_delivery(&mut tx, &order.order_uid, &order.delivery).await?;
                upsert_payment(&mut tx, &order.order_uid, &order.payment).await?;
                for item in &order.items {
                    upsert_item(&mut tx, &order.order_uid, item).await?;
                }
            }
            None => upsert_payload(&mut tx, &document.order_uid, &document.raw).await?,
        }

        tx.commit().await?;

        debug!("Order upserted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_raw(&self, order_uid: &str) -> Result<Bytes, RepositoryError> {
        let payload: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT payload FROM orders WHERE order_uid = $1")
                .bind(order_uid)
                .fetch_optional(&self.pool)
                .await?;

        payload.map(Bytes::from).ok_or(RepositoryError::NotFound)
    }

    #[instrument(skip(self))]
    async fn load_recent(&self, limit: usize) -> Result<Vec<(OrderUid, Bytes)>, RepositoryError> {
        let rows: Vec<(OrderUid, Vec<u8>)> = sqlx::query_as(
            r"
            SELECT order_uid, payload
            FROM orders
            ORDER BY updated_at DESC
            LIMIT $1
            ",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Loaded recent orders");
        Ok(rows
            .into_iter()
            .map(|(order_uid, payload)| (order_uid, Bytes::from(payload)))
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Payload-only write; header columns keep whatever they held before.
async fn upsert_payload(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &OrderUid,
    raw: &[u8],
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO orders (order_uid, payload, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (order_uid) DO UPDATE
        SET payload = EXCLUDED.payload, updated_at = now()
        ",
    )
    .bind(order_uid)
    .bind(raw)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_header(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    raw: &[u8],
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO orders (
            order_uid, track_number, entry, locale, internal_signature, customer_id,
            delivery_service, shardkey, sm_id, date_created, oof_shard, payload, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
        ON CONFLICT (order_uid) DO UPDATE SET
            track_number = EXCLUDED.track_number,
            entry = EXCLUDED.entry,
            locale = EXCLUDED.locale,
            internal_signature = EXCLUDED.internal_signature,
            customer_id = EXCLUDED.customer_id,
            delivery_service = EXCLUDED.delivery_service,
            shardkey = EXCLUDED.shardkey,
            sm_id = EXCLUDED.sm_id,
            date_created = EXCLUDED.date_created,
            oof_shard = EXCLUDED.oof_shard,
            payload = EXCLUDED.payload,
            updated_at = now()
        ",
    )
    .bind(&order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(&order.shardkey)
    .bind(order.sm_id)
    .bind(order.date_created)
    .bind(&order.oof_shard)
    .bind(raw)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_delivery(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &OrderUid,
    delivery: &Delivery,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (order_uid) DO UPDATE SET
            name = EXCLUDED.name,
            phone = EXCLUDED.phone,
            zip = EXCLUDED.zip,
            city = EXCLUDED.city,
            address = EXCLUDED.address,
            region = EXCLUDED.region,
            email = EXCLUDED.email
        ",
    )
    .bind(order_uid)
    .bind(&delivery.name)
    .bind(&delivery.phone)
    .bind(&delivery.zip)
    .bind(&delivery.city)
    .bind(&delivery.address)
    .bind(&delivery.region)
    .bind(&delivery.email)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Each order keeps exactly one payment: a previous payment row of the same
/// order under a different transaction id is replaced. A transaction id owned
/// by another order is a conflict and aborts the transaction.
async fn upsert_payment(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &OrderUid,
    payment: &Payment,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM payments WHERE order_uid = $1 AND transaction <> $2")
        .bind(order_uid)
        .bind(&payment.transaction)
        .execute(&mut **tx)
        .await?;

    let result = sqlx::query(
        r"
        INSERT INTO payments (
            transaction, order_uid, request_id, currency, provider, amount,
            payment_dt, bank, delivery_cost, goods_total, custom_fee
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (transaction) DO UPDATE SET
            request_id = EXCLUDED.request_id,
            currency = EXCLUDED.currency,
            provider = EXCLUDED.provider,
            amount = EXCLUDED.amount,
            payment_dt = EXCLUDED.payment_dt,
            bank = EXCLUDED.bank,
            delivery_cost = EXCLUDED.delivery_cost,
            goods_total = EXCLUDED.goods_total,
            custom_fee = EXCLUDED.custom_fee
        WHERE payments.order_uid = EXCLUDED.order_uid
        ",
    )
    .bind(&payment.transaction)
    .bind(order_uid)
    .bind(&payment.request_id)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.amount)
    .bind(payment.payment_dt)
    .bind(&payment.bank)
    .bind(payment.delivery_cost)
    .bind(payment.goods_total)
    .bind(payment.custom_fee)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "payment {} belongs to another order",
            payment.transaction
        )));
    }
    Ok(())
}

/// Items are upserted one by one; items missing from a resubmission are kept.
async fn upsert_item(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &OrderUid,
    item: &Item,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO items (
            chrt_id, order_uid, track_number, price, rid, name,
            sale, size, total_price, nm_id, brand, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (chrt_id) DO UPDATE SET
            order_uid = EXCLUDED.order_uid,
            track_number = EXCLUDED.track_number,
            price = EXCLUDED.price,
            rid = EXCLUDED.rid,
            name = EXCLUDED.name,
            sale = EXCLUDED.sale,
            size = EXCLUDED.size,
            total_price = EXCLUDED.total_price,
            nm_id = EXCLUDED.nm_id,
            brand = EXCLUDED.brand,
            status = EXCLUDED.status
        ",
    )
    .bind(item.chrt_id)
    .bind(order_uid)
    .bind(&item.track_number)
    .bind(item.price)
    .bind(&item.rid)
    .bind(&item.name)
    .bind(item.sale)
    .bind(&item.size)
    .bind(item.total_price)
    .bind(item.nm_id)
    .bind(&item.brand)
    .bind(item.status)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
