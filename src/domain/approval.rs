//! Withdrawal Approvals — Decisions and Quorum
//!
//! One decision per `(transaction, approver)` pair; resubmitting replaces
//! the prior decision. Quorum counts distinct approvers who said approve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transaction::TxId;

/// Approve or reject a pending withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// What a single `Reject` decision does to a pending withdrawal.
///
/// The source system never pinned this down, so it is a configuration
/// choice rather than a hard-coded behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RejectPolicy {
    /// One rejection cancels the withdrawal immediately.
    #[default]
    Cancel,
    /// Rejections are recorded but voting continues; the withdrawal only
    /// proceeds if quorum is still reached by other approvers.
    Continue,
}

/// A recorded approver decision on a withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    /// Withdrawal this decision applies to.
    pub transaction_id: TxId,
    /// Approver identity (unique per transaction).
    pub approver: String,
    /// Approve or reject.
    pub decision: Decision,
    /// Optional free-form note.
    pub note: String,
    /// When the decision was recorded (replacements refresh this).
    pub created_at: DateTime<Utc>,
}

/// Count distinct `Approve` decisions.
///
/// The store guarantees one row per approver, so a plain count is the
/// quorum tally.
pub fn count_approvals(approvals: &[Approval]) -> u32 {
    approvals
        .iter()
        .filter(|a| a.decision == Decision::Approve)
        .count() as u32
}

/// Whether the approvals satisfy the account's quorum requirement.
pub fn quorum_met(approvals: &[Approval], required: u32) -> bool {
    count_approvals(approvals) >= required
}
