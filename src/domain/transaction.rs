//! Gas Transactions — Lifecycle State Machine
//!
//! Every deposit and withdrawal is a `GasTransaction`. Withdrawals walk a
//! closed status machine; the transition table below is the single source
//! of truth and anything not listed is rejected with `InvalidTransition`.
//! The `Queued → Executing` edge doubles as the settlement claim: the store
//! applies it as an atomic conditional update, so exactly one poller wins.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transaction identifier used across ports and usecases.
pub type TxId = Uuid;

/// Gas account identifier (assigned at ensure time).
pub type GasAccountId = Uuid;

/// Deposit or withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdrawal,
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "deposit"),
            Self::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// Lifecycle status of a gas transaction.
///
/// Deposits use `Pending → Confirmed | Failed` and never touch the
/// approval/settlement path. Withdrawals use the remaining variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Deposit recorded, awaiting confirmation.
    Pending,
    /// Deposit credited (terminal).
    Confirmed,
    /// Deposit failed (terminal).
    Failed,
    /// Withdrawal deferred until `schedule_at`.
    Scheduled,
    /// Withdrawal awaiting approval quorum.
    PendingApproval,
    /// Quorum met, awaiting its schedule time.
    Approved,
    /// Eligible for settlement on the next poll cycle.
    Queued,
    /// Claimed by a poller; exactly one claim may be in flight.
    Executing,
    /// Settled successfully (terminal).
    Executed,
    /// Retry budget exhausted; quarantined for manual action (terminal).
    DeadLetter,
    /// Cancelled by operator or reject policy (terminal).
    Cancelled,
}

impl TxStatus {
    /// Whether this status admits no further automatic transitions.
    ///
    /// Dead letters are terminal for the poller and for `cancel`, but the
    /// transition table still allows the two manual dead-letter edges
    /// (retry and delete).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Failed | Self::Executed | Self::DeadLetter | Self::Cancelled
        )
    }

    /// Closed transition table for the status machine.
    pub fn can_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Pending, Self::Confirmed | Self::Failed)
                | (Self::Scheduled, Self::PendingApproval | Self::Cancelled)
                | (Self::PendingApproval, Self::Approved | Self::Cancelled)
                | (Self::Approved, Self::Queued | Self::Cancelled)
                | (Self::Queued, Self::Executing | Self::Cancelled)
                | (Self::Executing, Self::Executed | Self::Queued | Self::DeadLetter)
                | (Self::DeadLetter, Self::Queued | Self::Cancelled)
        )
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Scheduled => "scheduled",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Queued => "queued",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::DeadLetter => "dead_letter",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A single deposit or withdrawal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasTransaction {
    /// Transaction ID.
    pub id: TxId,
    /// Owning gas account.
    pub gas_account_id: GasAccountId,
    /// Deposit or withdrawal.
    pub kind: TxKind,
    /// Amount in GAS.
    pub amount: Decimal,
    /// Source address (deposits).
    pub from_address: String,
    /// Destination address (withdrawals).
    pub to_address: String,
    /// Deferred-execution time; `None` means immediate once approved.
    pub schedule_at: Option<DateTime<Utc>>,
    /// Current lifecycle status.
    pub status: TxStatus,
    /// Settlement attempts consumed so far.
    pub attempts: u32,
    /// Retry backoff gate: not eligible for claim before this instant.
    pub not_before: Option<DateTime<Utc>>,
    /// Reason recorded when the transaction was cancelled.
    pub cancel_reason: Option<String>,
    /// Last resolver error message, if any.
    pub last_error: Option<String>,
    /// Reference returned by the resolver on success.
    pub resolver_ref: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (also the claim liveness marker while
    /// `Executing`).
    pub updated_at: DateTime<Utc>,
}

impl GasTransaction {
    /// Create a confirmed deposit record.
    pub fn new_deposit(
        gas_account_id: GasAccountId,
        amount: Decimal,
        from: String,
        to: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            gas_account_id,
            kind: TxKind::Deposit,
            amount,
            from_address: from,
            to_address: to,
            schedule_at: None,
            status: TxStatus::Confirmed,
            attempts: 0,
            not_before: None,
            cancel_reason: None,
            last_error: None,
            resolver_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a withdrawal record.
    ///
    /// Starts `Scheduled` when `schedule_at` is in the future, otherwise
    /// `PendingApproval` (every withdrawal needs at least one approval).
    pub fn new_withdrawal(
        gas_account_id: GasAccountId,
        amount: Decimal,
        to: String,
        schedule_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let deferred = schedule_at.is_some_and(|at| at > now);
        Self {
            id: Uuid::new_v4(),
            gas_account_id,
            kind: TxKind::Withdrawal,
            amount,
            from_address: String::new(),
            to_address: to,
            schedule_at: schedule_at.filter(|at| *at > now),
            status: if deferred {
                TxStatus::Scheduled
            } else {
                TxStatus::PendingApproval
            },
            attempts: 0,
            not_before: None,
            cancel_reason: None,
            last_error: None,
            resolver_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the schedule gate has passed (or was never set).
    pub fn schedule_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule_at.is_none_or(|at| at <= now)
    }
}
