//! Prometheus implementation of the `Metrics` trait.
//!
//! Counters and histograms go through the global `metrics` registry; the
//! handle kept in `recorder.rs` renders them in Prometheus text format.

use crate::domain::{Metrics, PingOutcome};
use std::time::Instant;

/// Prometheus-backed metrics. Stateless; all state lives in the global registry.
pub struct PrometheusMetrics {}

impl PrometheusMetrics {
    pub fn new() -> Self {
        tracing::info!("Creating Prometheus metrics");
        PrometheusMetrics {}
    }
}

impl Metrics for PrometheusMetrics {
    fn render(&self) -> String {
        super::render_metrics()
    }

    fn record_ping(&self, outcome: &PingOutcome) {
        super::increment_pings_accepted();
        if outcome.user_created {
            super::increment_users_created();
        }
        if outcome.minutes_accrued {
            super::increment_buckets_accrued();
        }
    }

    fn record_ping_rejected(&self, reason: &'static str) {
        tracing::debug!(reason, "Recording rejected ping");
        super::increment_pings_rejected(reason);
    }

    fn record_ping_failed(&self) {
        super::increment_pings_failed();
    }

    fn record_http_request(&self, start: Instant, path: &str, method: &str, status: u16) {
        super::track_http_request(start, path, method, status);
    }
}
