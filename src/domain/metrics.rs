use super::models::PingOutcome;
use std::sync::Arc;
use std::time::Instant;

/// Abstraction for application metrics (counters, histograms).
pub trait Metrics: Send + Sync + 'static {
    // ---
    /// Render current metrics in Prometheus text format.
    fn render(&self) -> String;

    /// Record a ping that was stored successfully.
    fn record_ping(&self, outcome: &PingOutcome);

    /// Record a ping rejected before touching storage.
    fn record_ping_rejected(&self, reason: &'static str);

    /// Record a ping that failed in storage.
    fn record_ping_failed(&self);

    /// Record HTTP request duration and labels.
    fn record_http_request(&self, start: Instant, path: &str, method: &str, status: u16);
}

/// Type alias for any backend that implements Metrics.
pub type MetricsPtr = Arc<dyn Metrics>;
