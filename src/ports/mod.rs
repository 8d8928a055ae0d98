//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires from
//! the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `Store`: durable accounts/transactions/approvals/attempts plus the
//!   atomic conditional-transition primitive used for settlement claims
//! - `Resolver`: the pluggable value-transfer mechanism

pub mod resolver;
pub mod store;
