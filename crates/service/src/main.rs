//! Orderflow order service.
//!
//! This binary serves the order API on port 8081.
//!
//! # Architecture
//!
//! - Axum web framework for `POST /ingest` and `GET /order/{id}`
//! - Kafka topic between the write path and persistence
//! - A single consumer task persisting documents to `PostgreSQL`
//! - Bounded in-process cache, warmed from the store at startup
//!
//! # Startup
//!
//! Database and broker connectivity are checked before the listener binds;
//! either failing aborts startup. A failed or slow cache warm-up only logs.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use orderflow_service::cache::OrderCache;
use orderflow_service::config::ServiceConfig;
use orderflow_service::db::{self, OrderStore, PgOrderStore};
use orderflow_service::queue::{KafkaPublisher, KafkaSource, OrderConsumer, QueueError};
use orderflow_service::routes;
use orderflow_service::services::OrderService;
use orderflow_service::state::AppState;
use sentry::integrations::tracing as sentry_tracing;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServiceConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the tracing subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orderflow_service=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let (json_layer, text_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServiceConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p orderflow-cli -- migrate
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to PostgreSQL");
    tracing::info!("Database pool created");
    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pool));

    let publisher = KafkaPublisher::new(&config.kafka).expect("Failed to create Kafka producer");
    publisher
        .check_connectivity()
        .await
        .expect("Failed to reach Kafka");
    let mut source = KafkaSource::new(&config.kafka).expect("Failed to create Kafka consumer");

    let cache = Arc::new(OrderCache::new(config.cache.capacity));
    let orders = OrderService::new(Arc::clone(&cache), Arc::clone(&store), Arc::new(publisher));

    match orders
        .warm(config.cache.warm_rows(), config.cache.warm_timeout)
        .await
    {
        Ok(loaded) => tracing::info!(loaded, capacity = cache.capacity(), "Cache warm-up done"),
        Err(e) => tracing::warn!(error = %e, "Cache warm-up failed, starting cold"),
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    // Consumer task: one message at a time, refreshing the cache after each write
    let consumer_cache = Arc::clone(&cache);
    let consumer = OrderConsumer::new(store).on_persisted(move |order_uid, raw| {
        consumer_cache.set(order_uid.clone(), raw);
    });
    let consumer_cancel = cancel.clone();
    let consumer_task = tokio::spawn(async move {
        match consumer.run(&mut source, &consumer_cancel).await {
            QueueError::Cancelled => {}
            err => {
                // Surface the lost queue to the supervisor by shutting down
                tracing::error!(error = %err, "Order consumer stopped unexpectedly");
                consumer_cancel.cancel();
            }
        }
    });

    // Build router
    let app = routes::router(AppState::new(orders, config.web_dir.clone()))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    // Start server
    let addr = config.socket_addr();
    tracing::info!("orderflow-service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let server_cancel = cancel.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    tokio::select! {
        result = &mut server => log_server_exit(result),
        () = cancel.cancelled() => {
            match tokio::time::timeout(config.shutdown_grace, &mut server).await {
                Ok(result) => log_server_exit(result),
                Err(_) => {
                    tracing::warn!(
                        grace = ?config.shutdown_grace,
                        "Grace period elapsed, dropping in-flight requests"
                    );
                    server.abort();
                }
            }
        }
    }

    cancel.cancel();
    if let Err(e) = consumer_task.await {
        tracing::error!(error = %e, "Order consumer task failed");
    }
    tracing::info!(stats = ?cache.stats(), "Shutdown complete");
}

fn log_server_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => tracing::info!("Server stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Server error"),
        Err(e) => tracing::error!(error = %e, "Server task failed"),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM) and cancel `token`.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
        () = token.cancelled() => return,
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
    token.cancel();
}
