// Gateway module - controls public API for handlers
// Modules are private, only exported symbols are public

mod health;
mod metrics;
mod ping;
mod problem;
mod request_metrics;
mod root;

// Core handlers
pub use health::health_check;
pub use metrics::metrics_handler;
pub use root::root_handler;

// Usage metering
pub use ping::{ping_fallback, ping_handler};

pub use request_metrics::track_request;
