mod counters;
mod prometheus_metrics;
mod recorder;

pub use prometheus_metrics::PrometheusMetrics;
use std::sync::Arc;

pub(crate) use counters::{
    increment_buckets_accrued, increment_pings_accepted, increment_pings_failed,
    increment_pings_rejected, increment_users_created, track_http_request,
};
pub(crate) use recorder::{init_metrics, render_metrics};

/// Creates the metrics backend used when `USAGE_METRICS_TYPE=prom`.
///
/// Installs the global recorder on first use; `/metrics` then serves the
/// Prometheus text exposition.
pub fn create() -> anyhow::Result<crate::domain::MetricsPtr> {
    tracing::info!("Initializing Prometheus metrics");
    init_metrics()?;

    Ok(Arc::new(PrometheusMetrics::new()))
}
