//! Domain layer - Core gas bank models and state machine.
//!
//! This module contains the pure domain logic for the settlement engine.
//! No I/O and no ambient time allowed here (hexagonal architecture inner
//! ring). All types are serializable and testable in isolation.

pub mod account;
pub mod approval;
pub mod attempt;
pub mod clock;
pub mod error;
pub mod transaction;

// Re-export core types for convenience
pub use account::{normalize_wallet_address, GasAccount};
pub use approval::{count_approvals, quorum_met, Approval, Decision, RejectPolicy};
pub use attempt::{retry_backoff, AttemptResult, SettlementAttempt};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::GasBankError;
pub use transaction::{GasAccountId, GasTransaction, TxId, TxKind, TxStatus};
