//! Withdrawal Service - Request Intake, Listing, Cancellation
//!
//! Creates withdrawal transactions (reserving funds first), answers the
//! read queries the transport layer exposes, and implements the
//! cross-cutting cancel operation. Cancel never waits out an in-flight
//! settlement attempt: while a claim is held the call fails with
//! `CannotCancelExecuting` and the caller retries once the attempt
//! resolves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::account::{normalize_wallet_address, GasAccount};
use crate::domain::attempt::SettlementAttempt;
use crate::domain::clock::Clock;
use crate::domain::error::{GasBankError, Result};
use crate::domain::transaction::{GasAccountId, GasTransaction, TxId, TxKind, TxStatus};
use crate::ports::store::{Store, TxFilter};

use super::ledger::AccountLedger;

/// Balance and activity rollup for one workspace account.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountSummary {
    pub gas_account_id: GasAccountId,
    pub balance: Decimal,
    pub available: Decimal,
    pub locked_total: Decimal,
    pub pending_withdrawals: usize,
    pub pending_amount: Decimal,
    pub dead_letters: usize,
    pub generated_at: DateTime<Utc>,
}

/// Withdrawal intake and lifecycle queries.
pub struct WithdrawalService<S: Store, C: Clock> {
    store: Arc<S>,
    ledger: Arc<AccountLedger<S, C>>,
    clock: Arc<C>,
}

impl<S: Store, C: Clock> WithdrawalService<S, C> {
    /// Create the service over shared store, ledger, and clock.
    pub fn new(store: Arc<S>, ledger: Arc<AccountLedger<S, C>>, clock: Arc<C>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Request a withdrawal.
    ///
    /// Reserves funds, then records the transaction: `Scheduled` when
    /// `schedule_at` lies in the future, otherwise `PendingApproval`.
    pub async fn withdraw(
        &self,
        account_id: &str,
        gas_account_id: GasAccountId,
        amount: Decimal,
        to_address: &str,
        schedule_at: Option<DateTime<Utc>>,
    ) -> Result<GasTransaction> {
        if amount <= Decimal::ZERO {
            return Err(GasBankError::InvalidConfig(
                "withdrawal amount must be positive".into(),
            ));
        }
        let to_address = normalize_wallet_address(to_address).ok_or_else(|| {
            GasBankError::InvalidConfig(format!(
                "destination address {to_address} is not 0x-prefixed hex"
            ))
        })?;

        let account = self.owned_account(account_id, gas_account_id).await?;
        if !account.enabled {
            return Err(GasBankError::AccountDisabled);
        }

        self.ledger
            .reserve_for_withdrawal(gas_account_id, amount)
            .await?;

        let tx = GasTransaction::new_withdrawal(
            gas_account_id,
            amount,
            to_address,
            schedule_at,
            self.clock.now(),
        );
        let tx = match self.store.create_transaction(tx).await {
            Ok(tx) => tx,
            Err(err) => {
                self.ledger.release(gas_account_id, amount).await?;
                return Err(err.into());
            }
        };

        info!(
            transaction_id = %tx.id,
            gas_account_id = %gas_account_id,
            amount = %amount,
            destination = %tx.to_address,
            status = %tx.status,
            "gas withdrawal requested"
        );
        Ok(tx)
    }

    /// Cancel a withdrawal that has not started executing.
    ///
    /// Allowed from `Scheduled`, `PendingApproval`, `Approved`, and
    /// `Queued`; releases the reservation on success.
    pub async fn cancel(&self, account_id: &str, transaction_id: TxId, reason: &str) -> Result<GasTransaction> {
        let tx = self.owned_withdrawal(account_id, transaction_id).await?;

        match tx.status {
            TxStatus::Executing => {
                return Err(GasBankError::CannotCancelExecuting(transaction_id))
            }
            s if s.is_terminal() => {
                return Err(GasBankError::AlreadyTerminal(transaction_id, s))
            }
            _ => {}
        }

        let now = self.clock.now();
        let moved = self
            .store
            .transition(transaction_id, tx.status, TxStatus::Cancelled, now)
            .await?;
        if !moved {
            // Lost the race against the poller or another caller; report
            // against the fresh status.
            let fresh = self.store.get_transaction(transaction_id).await?;
            return Err(match fresh.status {
                TxStatus::Executing => GasBankError::CannotCancelExecuting(transaction_id),
                s if s.is_terminal() => GasBankError::AlreadyTerminal(transaction_id, s),
                s => GasBankError::InvalidTransition {
                    id: transaction_id,
                    from: s,
                    to: TxStatus::Cancelled,
                },
            });
        }

        self.ledger.release(tx.gas_account_id, tx.amount).await?;

        let mut cancelled = self.store.get_transaction(transaction_id).await?;
        cancelled.cancel_reason = Some(reason.to_string());
        let cancelled = self.store.update_transaction(cancelled).await?;

        info!(
            transaction_id = %transaction_id,
            account_id = %account_id,
            reason = %reason,
            "gas withdrawal cancelled"
        );
        Ok(cancelled)
    }

    /// Fetch one withdrawal owned by the account.
    pub async fn get(&self, account_id: &str, transaction_id: TxId) -> Result<GasTransaction> {
        self.owned_withdrawal(account_id, transaction_id).await
    }

    /// List the account's withdrawals, optionally filtered by status.
    pub async fn list(
        &self,
        account_id: &str,
        status: Option<TxStatus>,
        limit: usize,
    ) -> Result<Vec<GasTransaction>> {
        let account = self.account_of(account_id).await?;
        let txs = self
            .store
            .list_transactions(TxFilter {
                gas_account_id: Some(account.id),
                kind: Some(TxKind::Withdrawal),
                status,
                limit,
            })
            .await?;
        Ok(txs)
    }

    /// Settlement attempt history for one withdrawal.
    pub async fn list_attempts(
        &self,
        account_id: &str,
        transaction_id: TxId,
    ) -> Result<Vec<SettlementAttempt>> {
        self.owned_withdrawal(account_id, transaction_id).await?;
        Ok(self.store.list_attempts(transaction_id).await?)
    }

    /// Balance and pending-withdrawal rollup for dashboards.
    pub async fn summary(&self, account_id: &str) -> Result<AccountSummary> {
        let account = self.account_of(account_id).await?;
        let withdrawals = self
            .store
            .list_transactions(TxFilter {
                gas_account_id: Some(account.id),
                kind: Some(TxKind::Withdrawal),
                status: None,
                limit: 0,
            })
            .await?;

        let mut pending_withdrawals = 0;
        let mut pending_amount = Decimal::ZERO;
        let mut dead_letters = 0;
        for tx in &withdrawals {
            match tx.status {
                TxStatus::Scheduled
                | TxStatus::PendingApproval
                | TxStatus::Approved
                | TxStatus::Queued
                | TxStatus::Executing => {
                    pending_withdrawals += 1;
                    pending_amount += tx.amount;
                }
                TxStatus::DeadLetter => dead_letters += 1,
                _ => {}
            }
        }

        Ok(AccountSummary {
            gas_account_id: account.id,
            balance: account.balance,
            available: account.available(),
            locked_total: account.locked_total,
            pending_withdrawals,
            pending_amount,
            dead_letters,
            generated_at: self.clock.now(),
        })
    }

    async fn account_of(&self, account_id: &str) -> Result<GasAccount> {
        self.store
            .find_account_by_owner(account_id)
            .await?
            .ok_or_else(|| GasBankError::NotFound(format!("gas account for {account_id}")))
    }

    async fn owned_account(
        &self,
        account_id: &str,
        gas_account_id: GasAccountId,
    ) -> Result<GasAccount> {
        let account = self.store.get_account(gas_account_id).await?;
        if account.account_id != account_id {
            return Err(GasBankError::NotFound(format!(
                "gas account {gas_account_id} for {account_id}"
            )));
        }
        Ok(account)
    }

    async fn owned_withdrawal(
        &self,
        account_id: &str,
        transaction_id: TxId,
    ) -> Result<GasTransaction> {
        let tx = self.store.get_transaction(transaction_id).await?;
        let account = self.store.get_account(tx.gas_account_id).await?;
        if account.account_id != account_id {
            return Err(GasBankError::NotFound(format!(
                "withdrawal {transaction_id} for {account_id}"
            )));
        }
        if tx.kind != TxKind::Withdrawal {
            return Err(GasBankError::NotFound(format!(
                "withdrawal {transaction_id}"
            )));
        }
        Ok(tx)
    }
}
