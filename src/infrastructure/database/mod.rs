mod pool;
mod postgres_store;
mod queries;


pub use pool::connect_with_retry;
pub use postgres_store::{create_postgres_store, PostgresStore};
