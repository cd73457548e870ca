use metrics::{counter, histogram};
use std::time::Instant;

pub fn increment_pings_accepted() {
    counter!("usage_pings_accepted_total").increment(1);
}

pub fn increment_pings_rejected(reason: &'static str) {
    counter!("usage_pings_rejected_total", "reason" => reason).increment(1);
}

pub fn increment_pings_failed() {
    counter!("usage_pings_failed_total").increment(1);
}

pub fn increment_users_created() {
    counter!("usage_users_created_total").increment(1);
}

/// One increment per ten-minute bucket credited to a usage record.
pub fn increment_buckets_accrued() {
    counter!("usage_buckets_accrued_total").increment(1);
}

/// Track HTTP request latency, labelled by route, method and status.
pub fn track_http_request(start: Instant, path: &str, method: &str, status: u16) {
    let elapsed = start.elapsed();
    histogram!(
        "http_request_duration_seconds",
        "path" => path.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .record(elapsed);
}
