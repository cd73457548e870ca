mod memory_store;

pub use memory_store::{FaultPoint, MemoryStore};

use crate::domain::{SchemaStorePtr, UsageStorePtr};
use std::sync::Arc;

/// Creates an in-memory store.
///
/// Returns the concrete store together with its two trait views, which share
/// the same tables.
pub fn create() -> (Arc<MemoryStore>, UsageStorePtr, SchemaStorePtr) {
    // ---
    let store = Arc::new(MemoryStore::new());
    (store.clone(), store.clone(), store)
}
