//! Approval Collector - Quorum Tracking for Pending Withdrawals
//!
//! Records approver decisions (last decision per approver wins) and moves
//! a withdrawal to `Approved` the moment the quorum is met. What a single
//! rejection does is a policy choice: `cancel` kills the withdrawal and
//! releases its reservation, `continue` just records the vote.

use std::sync::Arc;

use tracing::info;

use crate::domain::approval::{quorum_met, Approval, Decision, RejectPolicy};
use crate::domain::clock::Clock;
use crate::domain::error::{GasBankError, Result};
use crate::domain::transaction::{GasTransaction, TxId, TxStatus};
use crate::ports::store::Store;

use super::ledger::AccountLedger;

/// Outcome of submitting one decision.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    /// The recorded (possibly replacing) decision.
    pub approval: Approval,
    /// Withdrawal status after the decision was applied.
    pub status: TxStatus,
    /// Whether this decision completed the quorum.
    pub quorum_met: bool,
}

/// Collects approver decisions and advances withdrawals past the quorum
/// gate.
pub struct ApprovalCollector<S: Store, C: Clock> {
    store: Arc<S>,
    ledger: Arc<AccountLedger<S, C>>,
    clock: Arc<C>,
    reject_policy: RejectPolicy,
}

impl<S: Store, C: Clock> ApprovalCollector<S, C> {
    pub fn new(
        store: Arc<S>,
        ledger: Arc<AccountLedger<S, C>>,
        clock: Arc<C>,
        reject_policy: RejectPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            reject_policy,
        }
    }

    /// Record one approver's decision on a withdrawal.
    ///
    /// Only `PendingApproval` withdrawals accept decisions; anything that
    /// already passed the gate reports `AlreadyApproved`, everything else
    /// `TransactionNotPending`.
    pub async fn submit(
        &self,
        transaction_id: TxId,
        approver: &str,
        decision: Decision,
        note: &str,
    ) -> Result<ApprovalOutcome> {
        let approver = approver.trim();
        if approver.is_empty() {
            return Err(GasBankError::InvalidConfig("approver required".into()));
        }

        let tx = self.store.get_transaction(transaction_id).await?;
        match tx.status {
            TxStatus::PendingApproval => {}
            TxStatus::Approved | TxStatus::Queued | TxStatus::Executing | TxStatus::Executed => {
                return Err(GasBankError::AlreadyApproved(transaction_id));
            }
            _ => return Err(GasBankError::TransactionNotPending(transaction_id)),
        }

        let approval = self
            .store
            .upsert_approval(Approval {
                transaction_id,
                approver: approver.to_string(),
                decision,
                note: note.to_string(),
                created_at: self.clock.now(),
            })
            .await?;

        let status = match decision {
            Decision::Reject if self.reject_policy == RejectPolicy::Cancel => {
                self.cancel_rejected(&tx, approver).await?
            }
            Decision::Reject => tx.status,
            Decision::Approve => self.advance_if_quorum(&tx).await?,
        };

        info!(
            transaction_id = %transaction_id,
            approver = %approver,
            decision = %decision,
            status = %status,
            "withdrawal approval recorded"
        );
        Ok(ApprovalOutcome {
            approval,
            status,
            quorum_met: matches!(status, TxStatus::Approved | TxStatus::Queued),
        })
    }

    /// All recorded decisions for a withdrawal, oldest first.
    pub async fn list(&self, transaction_id: TxId) -> Result<Vec<Approval>> {
        // Surface NotFound for bogus ids rather than an empty list.
        self.store.get_transaction(transaction_id).await?;
        Ok(self.store.list_approvals(transaction_id).await?)
    }

    async fn cancel_rejected(&self, tx: &GasTransaction, approver: &str) -> Result<TxStatus> {
        let now = self.clock.now();
        let moved = self
            .store
            .transition(tx.id, TxStatus::PendingApproval, TxStatus::Cancelled, now)
            .await?;
        if !moved {
            // Raced with a cancel or another rejection; the vote is
            // recorded either way.
            let fresh = self.store.get_transaction(tx.id).await?;
            return Ok(fresh.status);
        }

        self.ledger.release(tx.gas_account_id, tx.amount).await?;

        let mut cancelled = self.store.get_transaction(tx.id).await?;
        cancelled.cancel_reason = Some(format!("rejected by {approver}"));
        self.store.update_transaction(cancelled).await?;
        Ok(TxStatus::Cancelled)
    }

    async fn advance_if_quorum(&self, tx: &GasTransaction) -> Result<TxStatus> {
        let account = self.store.get_account(tx.gas_account_id).await?;
        let approvals = self.store.list_approvals(tx.id).await?;
        if !quorum_met(&approvals, account.required_approvals) {
            return Ok(TxStatus::PendingApproval);
        }

        let now = self.clock.now();
        let moved = self
            .store
            .transition(tx.id, TxStatus::PendingApproval, TxStatus::Approved, now)
            .await?;
        if !moved {
            let fresh = self.store.get_transaction(tx.id).await?;
            return Ok(fresh.status);
        }

        // Immediate withdrawals skip the schedule wait and queue now; the
        // poller would only pick them up a cycle later.
        if tx.schedule_due(now)
            && self
                .store
                .transition(tx.id, TxStatus::Approved, TxStatus::Queued, now)
                .await?
        {
            return Ok(TxStatus::Queued);
        }
        Ok(TxStatus::Approved)
    }
}
