// Test helpers are intentionally partially used
#![allow(dead_code)]

use acad_usage_meter::domain::{Consistency, ManualClock, MetricsPtr, PingAggregator};
use acad_usage_meter::{create_memory_store, create_noop_metrics, create_router, MemoryStore};
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Test Setup
// ============================================================================

/// Local time on the fixed test day.
pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    // ---
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid test timestamp")
}

/// A running server backed by the in-memory store and a settable clock.
pub struct TestServer {
    pub addr: std::net::SocketAddr,
    pub client: Client,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestServer {
    // ---
    pub async fn new() -> Self {
        // ---
        let metrics = create_noop_metrics().expect("noop metrics");
        Self::start(metrics, Consistency::Atomic).await
    }

    pub async fn with_metrics(metrics: MetricsPtr) -> Self {
        // ---
        Self::start(metrics, Consistency::Atomic).await
    }

    pub async fn with_consistency(consistency: Consistency) -> Self {
        // ---
        let metrics = create_noop_metrics().expect("noop metrics");
        Self::start(metrics, consistency).await
    }

    async fn start(metrics: MetricsPtr, consistency: Consistency) -> Self {
        // ---
        // Enable debug logging only when requested
        if std::env::var("TEST_DEBUG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("debug"))
                .with_ansi(false)
                .with_test_writer()
                .try_init();
        }

        let (store, usage, _schema) = create_memory_store();
        let clock = Arc::new(ManualClock::new(at(9, 5)));
        let aggregator = Arc::new(PingAggregator::new(
            usage.clone(),
            clock.clone(),
            "unknown",
            consistency,
        ));

        let app = create_router(aggregator, usage, metrics);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Spawn the server in the background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start
        sleep(Duration::from_millis(100)).await;

        Self {
            addr,
            client: Client::new(),
            store,
            clock,
        }
    }

    pub fn url(&self, path: &str) -> String {
        // ---
        format!("http://{}{}", self.addr, path)
    }

    /// Sends `GET /ping` with the given query string.
    pub async fn ping(&self, query: &str) -> reqwest::Response {
        // ---
        self.client
            .get(self.url(&format!("/ping?{query}")))
            .send()
            .await
            .expect("Failed to send ping")
    }
}
