//! Resolver Port - Value Transfer Interface
//!
//! The resolver is the pluggable component that actually moves GAS: an
//! HTTP broadcaster in front of an on-chain transfer, gated by a
//! contract/method allowlist. The poller is its only caller.
//!
//! The contract is deliberately strict about ambiguity: a `Timeout` means
//! the outcome is unknown and the poller must treat it as a retriable
//! failure — never as success.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::transaction::GasTransaction;

/// On-chain/off-chain reference returned for a confirmed transfer.
pub type ResolverRef = String;

/// Failures reported by a resolver.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Deadline elapsed with the outcome unknown.
    #[error("resolver timed out with indeterminate outcome")]
    Timeout,

    /// The resolver (or the allowlist in front of it) refused the
    /// transfer outright.
    #[error("resolver rejected transfer: {0}")]
    Rejected(String),

    /// Transport or protocol failure before a definite answer.
    #[error("resolver transport error: {0}")]
    Transport(String),
}

/// Executes the actual value transfer for a claimed withdrawal.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Broadcast the transfer, returning a reference on positive
    /// confirmation.
    async fn execute(&self, tx: &GasTransaction) -> Result<ResolverRef, ResolverError>;

    /// Whether the resolver endpoint is reachable.
    async fn is_healthy(&self) -> bool;
}
