//! Per-key asynchronous mutual exclusion.
//!
//! Each distinct key gets its own `tokio::sync::Mutex`. Slots are held
//! weakly by the registry, so a key's mutex lives exactly as long as someone
//! holds or waits for it; dead slots are swept when the registry grows.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const MIN_SWEEP_THRESHOLD: usize = 64;

/// Registry of per-key locks.
pub struct KeyedLocks<K> {
    // ---
    registry: Mutex<Registry<K>>,
}

struct Registry<K> {
    slots: HashMap<K, Weak<AsyncMutex<()>>>,
    sweep_at: usize,
}

/// Held while the caller owns the key. Dropping it releases the key.
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        // ---
        Self::new()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    // ---
    pub fn new() -> Self {
        // ---
        Self {
            registry: Mutex::new(Registry {
                slots: HashMap::new(),
                sweep_at: MIN_SWEEP_THRESHOLD,
            }),
        }
    }

    /// Waits until `key` is free and takes it.
    ///
    /// Callers contending on the same key are serialised; callers on
    /// different keys never wait for each other.
    pub async fn lock(&self, key: &K) -> KeyGuard {
        // ---
        let slot = self.slot(key);
        KeyGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of keys currently held or waited on.
    #[cfg(test)]
    fn active_keys(&self) -> usize {
        // ---
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry
            .slots
            .values()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }

    fn slot(&self, key: &K) -> Arc<AsyncMutex<()>> {
        // ---
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(live) = registry.slots.get(key).and_then(Weak::upgrade) {
            return live;
        }

        if registry.slots.len() >= registry.sweep_at {
            registry.slots.retain(|_, slot| slot.strong_count() > 0);
            registry.sweep_at = (registry.slots.len() * 2).max(MIN_SWEEP_THRESHOLD);
        }

        let slot = Arc::new(AsyncMutex::new(()));
        registry.slots.insert(key.clone(), Arc::downgrade(&slot));
        slot
    }
}
