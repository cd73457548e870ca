// src/lib.rs
use anyhow::{Context, Result};
use app_state::AppState;
use axum::{middleware, routing::get, Router};
use std::sync::Arc;

use domain::{
    create_system_clock, MetricsPtr, PingAggregator, SchemaBootstrapper, SchemaStorePtr,
    UsageStorePtr,
};
use handlers::{
    health_check, metrics_handler, ping_fallback, ping_handler, root_handler, track_request,
};

// Public exports (visible outside this module)
pub mod domain;

// Internal-only exports (sibling access within this module)
mod app_state;
mod config;
mod handlers;
mod infrastructure;

pub use config::*;

// Publicly expose the infrastructure creation functions
pub use infrastructure::{
    connect_with_retry, // ---
    create_memory_store,
    create_noop_metrics,
    create_postgres_store,
    create_prom_metrics,
    FaultPoint,
    MemoryStore,
    PostgresStore,
};

/// Build the HTTP router around an already constructed aggregator.
pub fn create_router(aggregator: Arc<PingAggregator>, store: UsageStorePtr, metrics: MetricsPtr) -> Router {
    // ---
    let app_state = AppState::new(aggregator, store, metrics);

    Router::new()
        .route("/", get(root_handler))
        .route("/ping", get(ping_handler))
        .route("/ping/", get(ping_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .fallback(ping_fallback)
        .layer(middleware::from_fn_with_state(app_state.clone(), track_request))
        .with_state(app_state)
}

/// Wire storage, metrics and the aggregator from configuration, bootstrap
/// the schema, and return the ready router.
///
/// # Errors
/// Fails when the metrics backend or database pool cannot be set up, or when
/// `bootstrap_strict` is set and any bootstrap step failed.
pub async fn build_service(config: &AppConfig) -> Result<Router> {
    // ---
    let (store, schema): (UsageStorePtr, SchemaStorePtr) = match config.service.store_backend {
        StoreBackend::Postgres => {
            let database = config
                .database
                .as_ref()
                .context("postgres backend selected without database configuration")?;
            let pool = connect_with_retry(database).await?;
            let postgres = Arc::new(create_postgres_store(pool, &config.schema));
            (postgres.clone(), postgres)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; usage data is lost on exit");
            let (_memory, store, schema) = create_memory_store();
            (store, schema)
        }
    };

    build_service_with_stores(config, store, schema).await
}

/// Same as [`build_service`] but over storage the caller already built.
///
/// # Errors
/// Fails when the metrics backend cannot be set up, or when
/// `bootstrap_strict` is set and any bootstrap step failed.
pub async fn build_service_with_stores(
    config: &AppConfig,
    store: UsageStorePtr,
    schema: SchemaStorePtr,
) -> Result<Router> {
    // ---
    let metrics = match config.service.metrics {
        MetricsBackend::Prometheus => create_prom_metrics()?,
        MetricsBackend::Noop => create_noop_metrics()?,
    };

    let report = SchemaBootstrapper::new(schema, config.schema.unknown_value.clone())
        .run()
        .await;
    if !report.is_clean() {
        if config.service.bootstrap_strict {
            anyhow::bail!("schema bootstrap failed: {:?}", report.failures);
        }
        tracing::warn!(
            failures = report.failures.len(),
            "Continuing after bootstrap failures"
        );
    }

    let aggregator = Arc::new(PingAggregator::new(
        store.clone(),
        create_system_clock(),
        config.schema.unknown_value.clone(),
        config.service.consistency,
    ));
    tracing::info!(consistency = ?config.service.consistency, "Ping aggregator ready");

    Ok(create_router(aggregator, store, metrics))
}
