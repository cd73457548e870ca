mod noop_metrics;

pub use noop_metrics::NoopMetrics;
use std::sync::Arc;

/// Creates the metrics backend used when `USAGE_METRICS_TYPE=noop`.
///
/// `/metrics` renders an empty body with this backend.
pub fn create() -> anyhow::Result<crate::domain::MetricsPtr> {
    Ok(Arc::new(NoopMetrics::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PingOutcome;
    use std::time::Instant;

    #[test]
    fn noop_renders_nothing() {
        let metrics = create().expect("noop metrics");
        metrics.record_ping(&PingOutcome {
            user_created: true,
            minutes_accrued: true,
            organisation_id: -1,
        });
        metrics.record_ping_rejected("missing_user_name");
        metrics.record_http_request(Instant::now(), "/ping", "GET", 200);
        assert!(metrics.render().is_empty());
    }
}
