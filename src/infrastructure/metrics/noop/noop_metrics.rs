use crate::domain::{Metrics, PingOutcome};
use std::time::Instant;

/// Metrics sink that drops everything.
#[derive(Default)]
pub struct NoopMetrics;

impl NoopMetrics {
    pub fn new() -> Self {
        NoopMetrics
    }
}

impl Metrics for NoopMetrics {
    // ---
    fn render(&self) -> String {
        String::new()
    }
    fn record_ping(&self, _: &PingOutcome) {}
    fn record_ping_rejected(&self, _: &'static str) {}
    fn record_ping_failed(&self) {}
    fn record_http_request(&self, _: Instant, _: &str, _: &str, _: u16) {}
}
