//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies. Each sub-module groups adapters by
//! infrastructure concern.
//!
//! Adapter categories:
//! - `chain`: Resolver HTTP broadcaster with contract/method allowlist
//! - `metrics`: Prometheus metrics export and health probes
//! - `persistence`: In-memory `Store` implementation

pub mod chain;
pub mod metrics;
pub mod persistence;
