//! HTTP route handlers for the order service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Landing page (web/index.html)
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (store ping)
//!
//! # Orders
//! POST /ingest                 - Queue an order document (202 "queued")
//! GET  /order/{id}             - Order document as JSON
//! GET  /order                  - 400, id required
//! ```

pub mod health;
pub mod home;
pub mod orders;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::middleware::{make_request_span, request_id_middleware};
use crate::state::AppState;

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest", post(orders::ingest))
        .route("/order", get(orders::missing_id))
        .route("/order/", get(orders::missing_id))
        .route("/order/{id}", get(orders::show))
}

/// Create the full application router with tracing and request ids.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home::index))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(order_routes())
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
}
