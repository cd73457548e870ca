mod aggregator;
mod bootstrap;
mod bucket;
mod clock;
mod errors;
mod keyed_lock;
mod metrics;
mod models;
mod repository;

// Publicly expose the Metrics abstraction
pub use metrics::{Metrics, MetricsPtr};

// Core components
pub use aggregator::{Consistency, PingAggregator};
pub use bootstrap::{BootstrapFailure, BootstrapReport, SchemaBootstrapper};
pub use bucket::{opens_new_bucket, same_bucket, BUCKET_WIDTH_MINUTES};
pub use keyed_lock::{KeyGuard, KeyedLocks};

// Storage abstractions
pub use errors::{PingError, StoreError};
pub use repository::{
    PingTransaction, SchemaObject, SchemaStore, SchemaStorePtr, UsageStore, UsageStorePtr,
};

pub use clock::{create_system_clock, Clock, ClockPtr, ManualClock, SystemClock};
pub use models::{
    Application, ApplicationRow, MeteredUser, Ping, PingOutcome, PingParams, UsageKey,
    UsageRecord, UserIdentity, MINUTES_PER_BUCKET, UNKNOWN_ORGANISATION_ID,
};
