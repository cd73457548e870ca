//! Application state management.
//!
//! Shared state handed to every Axum handler via the `State` extractor. It
//! is built once at startup and cloned per request; every field is an `Arc`.

use crate::domain::{MetricsPtr, PingAggregator, UsageStorePtr};
use std::sync::Arc;

/// Shared application state passed to all Axum handlers.
///
/// Handlers depend on the domain abstractions only: the aggregator owns the
/// ping rules, the store is exposed for the full health check, and metrics
/// may be Prometheus-backed or a no-op.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Ping aggregation rules, including the per-user and per-bucket locks.
    aggregator: Arc<PingAggregator>,

    /// Usage store backing the aggregator.
    store: UsageStorePtr,

    /// Metrics implementation for recording application events.
    metrics: MetricsPtr,
}

impl AppState {
    // ---

    pub fn new(aggregator: Arc<PingAggregator>, store: UsageStorePtr, metrics: MetricsPtr) -> Self {
        // ---
        AppState {
            aggregator,
            store,
            metrics,
        }
    }

    /// Get a reference to the ping aggregator.
    pub(crate) fn aggregator(&self) -> &PingAggregator {
        // ---
        &self.aggregator
    }

    /// Get a reference to the usage store.
    pub(crate) fn store(&self) -> &UsageStorePtr {
        // ---
        &self.store
    }

    /// Get a reference to the metrics implementation.
    pub(crate) fn metrics(&self) -> &MetricsPtr {
        // ---
        &self.metrics
    }
}
