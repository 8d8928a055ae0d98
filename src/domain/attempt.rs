//! Settlement Attempts — Append-Only Audit Trail
//!
//! One record per resolver invocation. `attempt_number` is strictly
//! increasing per transaction and drives both the exponential backoff
//! schedule and the dead-letter threshold.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transaction::TxId;

/// Outcome of one resolver invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    /// Resolver confirmed the transfer.
    Success,
    /// Resolver reported a definite failure.
    Fail,
    /// Outcome unknown (deadline elapsed) — always treated as a failure
    /// for retry purposes, never as success.
    Timeout,
}

impl std::fmt::Display for AttemptResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Fail => write!(f, "fail"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// One settlement attempt for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementAttempt {
    /// Withdrawal this attempt belongs to.
    pub transaction_id: TxId,
    /// 1-based, strictly increasing per transaction.
    pub attempt_number: u32,
    /// When the resolver call started.
    pub started_at: DateTime<Utc>,
    /// When the resolver call finished (or timed out).
    pub finished_at: DateTime<Utc>,
    /// Outcome classification.
    pub result: AttemptResult,
    /// Error message for failed/timed-out attempts.
    pub error: Option<String>,
    /// Resolver reference for successful attempts.
    pub resolver_ref: Option<String>,
}

/// Exponential backoff delay before the next attempt.
///
/// `base * 2^(attempt_number - 1)`, capped at 1 hour so a long-failing
/// withdrawal still gets periodic attention until the budget runs out.
pub fn retry_backoff(base: Duration, attempt_number: u32) -> Duration {
    const CAP: Duration = Duration::from_secs(3600);
    let shift = attempt_number.saturating_sub(1).min(20);
    let delay = base.saturating_mul(1u32 << shift);
    delay.min(CAP)
}
