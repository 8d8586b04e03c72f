//! Order ingest and lookup handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

/// Accept an order document for asynchronous processing.
///
/// Responds `202 queued` once the queue acknowledged the write. The order
/// becomes readable after the consumer persisted it.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn ingest(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let order_uid = state.orders().ingest(body).await?;
    add_breadcrumb("orders", "Order queued", Some(&[("order_uid", order_uid.as_str())]));
    Ok((StatusCode::ACCEPTED, "queued"))
}

/// Return the stored JSON document of an order.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let document = state.orders().get(&id).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], document))
}

/// `GET /order` without an id.
pub async fn missing_id() -> AppError {
    AppError::BadRequest("missing order id".to_string())
}
