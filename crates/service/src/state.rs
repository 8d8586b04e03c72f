//! Application state shared across handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::services::OrderService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// order coordinator and static configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    orders: OrderService,
    web_dir: PathBuf,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `orders` - Order read/write coordinator
    /// * `web_dir` - Directory holding the landing page
    #[must_use]
    pub fn new(orders: OrderService, web_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                orders,
                web_dir: web_dir.into(),
            }),
        }
    }

    /// Get a reference to the order coordinator.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    /// Directory the landing page is served from.
    #[must_use]
    pub fn web_dir(&self) -> &Path {
        &self.inner.web_dir
    }
}
