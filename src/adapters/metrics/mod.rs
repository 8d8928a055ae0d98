//! Metrics and Monitoring Adapters
//!
//! Prometheus metrics export plus /live and /ready probes on one axum
//! listener, fed by the poller's per-tick reports.

pub mod health;
pub mod prometheus;

pub use health::HealthState;
pub use prometheus::MetricsRegistry;
