//! Application state for the Libris HTTP server.

use crate::config::LendingConfig;
use libris_core::{BorrowLifecycle, LibraryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is a handle.
#[derive(Clone)]
pub struct AppState {
    /// Borrow/return/penalty transitions and the store behind them
    pub lifecycle: BorrowLifecycle,

    /// Lending settings read by handlers (horizons, limits)
    pub lending: Arc<LendingConfig>,

    /// Prometheus handle, when this process installed the recorder
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        lifecycle: BorrowLifecycle,
        lending: LendingConfig,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            lifecycle,
            lending: Arc::new(lending),
            metrics,
        }
    }

    /// The store, for read-side queries.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        self.lifecycle.store()
    }
}
