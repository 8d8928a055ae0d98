//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the gas
//! bank's workflows. Each use case is a self-contained business
//! operation.
//!
//! Use cases:
//! - `AccountLedger`: Balance custody, deposits, reservations
//! - `WithdrawalService`: Withdrawal intake, queries, cancellation
//! - `ApprovalCollector`: Quorum tracking for pending withdrawals
//! - `SettlementPoller`: Background settlement with retry and backoff
//! - `DeadLetterManager`: Manual retry/discard of quarantined withdrawals

pub mod approvals;
pub mod dead_letter;
pub mod ledger;
pub mod poller;
pub mod withdrawals;

pub use approvals::{ApprovalCollector, ApprovalOutcome};
pub use dead_letter::DeadLetterManager;
pub use ledger::AccountLedger;
pub use poller::{PollerSettings, SettlementPoller, TickReport};
pub use withdrawals::{AccountSummary, WithdrawalService};
