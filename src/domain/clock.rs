use chrono::{Local, NaiveDateTime};
use std::sync::Arc;

/// Source of the wall-clock time used for bucket decisions.
///
/// Buckets follow local wall-clock time, so implementations return a naive
/// local timestamp.
pub trait Clock: Send + Sync + 'static {
    // ---
    fn now(&self) -> NaiveDateTime;
}

/// Type alias for any backend that implements Clock.
pub type ClockPtr = Arc<dyn Clock>;

/// Reads the host's local time.
pub struct SystemClock;

impl Clock for SystemClock {
    // ---
    fn now(&self) -> NaiveDateTime {
        // ---
        Local::now().naive_local()
    }
}

pub fn create_system_clock() -> ClockPtr {
    // ---
    Arc::new(SystemClock)
}

/// A clock that only moves when told to.
///
/// Lets tests step through bucket boundaries deterministically.
pub struct ManualClock {
    // ---
    now: std::sync::Mutex<NaiveDateTime>,
}

impl ManualClock {
    // ---
    pub fn new(start: NaiveDateTime) -> Self {
        // ---
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        // ---
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = now;
    }
}

impl Clock for ManualClock {
    // ---
    fn now(&self) -> NaiveDateTime {
        // ---
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
