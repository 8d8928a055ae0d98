//! Dead Letter Manager - Manual Handling of Quarantined Withdrawals
//!
//! Dead letters are withdrawals that burned their full retry budget. They
//! hold no reservation (the poller released it on quarantine), so a retry
//! must re-reserve funds first and can fail the same balance and
//! daily-limit checks as a fresh withdrawal.

use std::sync::Arc;

use tracing::info;

use crate::domain::clock::Clock;
use crate::domain::error::{GasBankError, Result};
use crate::domain::transaction::{GasTransaction, TxId, TxKind, TxStatus};
use crate::ports::store::{Store, TxFilter};

use super::ledger::AccountLedger;

/// Operator actions on dead-lettered withdrawals.
pub struct DeadLetterManager<S: Store, C: Clock> {
    store: Arc<S>,
    ledger: Arc<AccountLedger<S, C>>,
    clock: Arc<C>,
    /// Whether a retried withdrawal gets its attempt budget back.
    reset_attempts: bool,
}

impl<S: Store, C: Clock> DeadLetterManager<S, C> {
    pub fn new(
        store: Arc<S>,
        ledger: Arc<AccountLedger<S, C>>,
        clock: Arc<C>,
        reset_attempts: bool,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            reset_attempts,
        }
    }

    /// List the account's dead-lettered withdrawals, newest first.
    pub async fn list(&self, account_id: &str) -> Result<Vec<GasTransaction>> {
        let account = self
            .store
            .find_account_by_owner(account_id)
            .await?
            .ok_or_else(|| GasBankError::NotFound(format!("gas account for {account_id}")))?;
        let txs = self
            .store
            .list_transactions(TxFilter {
                gas_account_id: Some(account.id),
                kind: Some(TxKind::Withdrawal),
                status: Some(TxStatus::DeadLetter),
                limit: 0,
            })
            .await?;
        Ok(txs)
    }

    /// Requeue a dead letter for another settlement pass.
    ///
    /// Funds are reserved before the status moves, so an account that can
    /// no longer cover the withdrawal keeps it quarantined instead of
    /// queueing something unpayable.
    pub async fn retry(&self, transaction_id: TxId) -> Result<GasTransaction> {
        let tx = self.dead_letter(transaction_id).await?;

        self.ledger
            .reserve_for_withdrawal(tx.gas_account_id, tx.amount)
            .await?;

        let now = self.clock.now();
        let moved = self
            .store
            .transition(transaction_id, TxStatus::DeadLetter, TxStatus::Queued, now)
            .await?;
        if !moved {
            // Raced with another operator; unwind the fresh reservation.
            self.ledger.release(tx.gas_account_id, tx.amount).await?;
            return Err(GasBankError::NotDeadLetter(transaction_id));
        }

        let mut requeued = self.store.get_transaction(transaction_id).await?;
        if self.reset_attempts {
            requeued.attempts = 0;
        }
        requeued.not_before = None;
        requeued.last_error = None;
        let requeued = self.store.update_transaction(requeued).await?;

        info!(
            transaction_id = %transaction_id,
            attempts = requeued.attempts,
            "dead-lettered withdrawal requeued"
        );
        Ok(requeued)
    }

    /// Permanently discard a dead letter.
    ///
    /// No reservation exists at this point, so nothing is released.
    pub async fn delete(&self, transaction_id: TxId, reason: &str) -> Result<GasTransaction> {
        self.dead_letter(transaction_id).await?;

        let now = self.clock.now();
        let moved = self
            .store
            .transition(transaction_id, TxStatus::DeadLetter, TxStatus::Cancelled, now)
            .await?;
        if !moved {
            return Err(GasBankError::NotDeadLetter(transaction_id));
        }

        let mut cancelled = self.store.get_transaction(transaction_id).await?;
        cancelled.cancel_reason = Some(reason.to_string());
        let cancelled = self.store.update_transaction(cancelled).await?;

        info!(
            transaction_id = %transaction_id,
            reason = %reason,
            "dead-lettered withdrawal discarded"
        );
        Ok(cancelled)
    }

    async fn dead_letter(&self, transaction_id: TxId) -> Result<GasTransaction> {
        let tx = self.store.get_transaction(transaction_id).await?;
        if tx.status != TxStatus::DeadLetter {
            return Err(GasBankError::NotDeadLetter(transaction_id));
        }
        Ok(tx)
    }
}
