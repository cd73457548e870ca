mod database;
pub mod memory;
pub mod metrics;

// Re-export the factory functions for easy access
pub use database::{connect_with_retry, create_postgres_store, PostgresStore};
pub use memory::{create as create_memory_store, FaultPoint, MemoryStore};
pub use metrics::{create_noop_metrics, create_prom_metrics};
