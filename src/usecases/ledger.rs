//! Account Ledger - Balance Custody and Reservations
//!
//! Sole owner of `GasAccount.balance` and `locked_total`. Withdrawals move
//! money in two phases: `reserve` locks funds while the withdrawal waits
//! for approval and settlement, then the poller either `commit`s (balance
//! debited, amount counted against the UTC-day limit) or `release`s
//! (reservation unwound, nothing counted).
//!
//! Every mutation goes through a versioned read-modify-write loop: the
//! store rejects stale writes, so concurrent deposits and reservations on
//! the same account serialize instead of losing updates.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::account::{normalize_wallet_address, GasAccount};
use crate::domain::clock::Clock;
use crate::domain::error::{GasBankError, Result};
use crate::domain::transaction::{GasAccountId, GasTransaction};
use crate::ports::store::{Store, StoreError};

/// Retries for versioned account updates before giving up.
const UPDATE_RETRIES: usize = 5;

/// Balance custody usecase. See module docs for the reservation model.
pub struct AccountLedger<S: Store, C: Clock> {
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S: Store, C: Clock> AccountLedger<S, C> {
    /// Create a ledger over the given store and clock.
    pub fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Idempotent create-or-update of a workspace's gas account.
    ///
    /// Fails with `InvalidConfig` for a quorum below one or negative
    /// limits, and with `WalletInUse` when the wallet address is already
    /// linked to a different workspace.
    pub async fn ensure(
        &self,
        account_id: &str,
        wallet_address: &str,
        min_balance: Decimal,
        daily_limit: Decimal,
        required_approvals: u32,
    ) -> Result<GasAccount> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(GasBankError::InvalidConfig("account_id required".into()));
        }
        if required_approvals < 1 {
            return Err(GasBankError::InvalidConfig(
                "required_approvals must be at least 1".into(),
            ));
        }
        if daily_limit < Decimal::ZERO {
            return Err(GasBankError::InvalidConfig(
                "daily_limit must not be negative".into(),
            ));
        }
        if min_balance < Decimal::ZERO {
            return Err(GasBankError::InvalidConfig(
                "min_balance must not be negative".into(),
            ));
        }

        let wallet = if wallet_address.trim().is_empty() {
            None
        } else {
            Some(normalize_wallet_address(wallet_address).ok_or_else(|| {
                GasBankError::InvalidConfig(format!(
                    "wallet address {wallet_address} is not 0x-prefixed hex"
                ))
            })?)
        };

        // A wallet may back at most one gas account.
        if let Some(ref wallet) = wallet {
            if let Some(existing) = self.store.find_account_by_wallet(wallet).await? {
                if existing.account_id != account_id {
                    return Err(GasBankError::WalletInUse);
                }
            }
        }

        if let Some(existing) = self.store.find_account_by_owner(account_id).await? {
            let updated = self
                .mutate_account(existing.id, |acct| {
                    if let Some(ref wallet) = wallet {
                        acct.wallet_address.clone_from(wallet);
                    }
                    acct.min_balance = min_balance;
                    acct.daily_limit = daily_limit;
                    acct.required_approvals = required_approvals;
                    Ok(())
                })
                .await?;
            return Ok(updated);
        }

        let account = GasAccount::new(
            account_id.to_string(),
            wallet.unwrap_or_default(),
            min_balance,
            daily_limit,
            required_approvals,
            self.clock.now(),
        );
        let created = self.store.create_account(account).await?;
        info!(
            gas_account_id = %created.id,
            account_id = %created.account_id,
            wallet = %created.wallet_address,
            required_approvals = created.required_approvals,
            "gas account ensured"
        );
        Ok(created)
    }

    /// Credit a confirmed on-chain deposit.
    ///
    /// `external_tx_id` is the idempotency key: the second call with the
    /// same id fails with `DuplicateTransaction` and credits nothing.
    pub async fn deposit(
        &self,
        account_id: &str,
        gas_account_id: GasAccountId,
        amount: Decimal,
        external_tx_id: &str,
        from_address: &str,
        to_address: &str,
    ) -> Result<GasTransaction> {
        if amount <= Decimal::ZERO {
            return Err(GasBankError::InvalidConfig(
                "deposit amount must be positive".into(),
            ));
        }
        let external_tx_id = external_tx_id.trim();
        if external_tx_id.is_empty() {
            return Err(GasBankError::InvalidConfig("tx_id required".into()));
        }

        let account = self.store.get_account(gas_account_id).await?;
        if account.account_id != account_id {
            return Err(GasBankError::NotFound(format!(
                "gas account {gas_account_id} for {account_id}"
            )));
        }
        if !account.enabled {
            return Err(GasBankError::AccountDisabled);
        }

        if !self.store.record_deposit_ref(external_tx_id).await? {
            return Err(GasBankError::DuplicateTransaction(external_tx_id.into()));
        }

        self.mutate_account(gas_account_id, |acct| {
            acct.balance += amount;
            Ok(())
        })
        .await?;

        let tx = GasTransaction::new_deposit(
            gas_account_id,
            amount,
            from_address.to_string(),
            to_address.to_string(),
            self.clock.now(),
        );
        let tx = match self.store.create_transaction(tx).await {
            Ok(tx) => tx,
            Err(err) => {
                // Unwind the credit so balance and ledger rows stay in step.
                if let Err(rollback) = self
                    .mutate_account(gas_account_id, |acct| {
                        acct.balance -= amount;
                        Ok(())
                    })
                    .await
                {
                    warn!(
                        gas_account_id = %gas_account_id,
                        error = %rollback,
                        "failed to roll back deposit credit"
                    );
                }
                return Err(err.into());
            }
        };

        info!(
            gas_account_id = %gas_account_id,
            amount = %amount,
            tx_id = external_tx_id,
            "gas deposit recorded"
        );
        Ok(tx)
    }

    /// Lock funds for a withdrawal awaiting approval and settlement.
    ///
    /// Checks available balance, the `min_balance` floor, and the UTC-day
    /// limit. Open reservations count against the daily limit alongside
    /// committed amounts — otherwise two concurrent reservations could
    /// both pass the check and later both commit past the cap.
    pub async fn reserve_for_withdrawal(
        &self,
        gas_account_id: GasAccountId,
        amount: Decimal,
    ) -> Result<()> {
        let today = self.clock.now().date_naive();
        self.mutate_account(gas_account_id, |acct| {
            if !acct.enabled {
                return Err(GasBankError::AccountDisabled);
            }
            let available = acct.available();
            if available < amount {
                return Err(GasBankError::InsufficientBalance {
                    available,
                    requested: amount,
                });
            }
            if available - amount < acct.min_balance {
                return Err(GasBankError::InsufficientBalance {
                    available: available - acct.min_balance,
                    requested: amount,
                });
            }
            if acct.daily_limit > Decimal::ZERO {
                let would_use = acct.daily_used(today) + acct.locked_total + amount;
                if would_use > acct.daily_limit {
                    return Err(GasBankError::DailyLimitExceeded {
                        limit: acct.daily_limit,
                        would_use,
                    });
                }
            }
            acct.locked_total += amount;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Finalize a reservation after confirmed settlement: debit the
    /// balance and count the amount against today's limit.
    pub async fn commit(&self, gas_account_id: GasAccountId, amount: Decimal) -> Result<()> {
        let today = self.clock.now().date_naive();
        self.mutate_account(gas_account_id, |acct| {
            acct.locked_total = (acct.locked_total - amount).max(Decimal::ZERO);
            acct.balance = (acct.balance - amount).max(Decimal::ZERO);
            acct.record_commit(amount, today);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Unwind a reservation after cancellation or terminal failure.
    /// Released amounts never count against the daily limit.
    pub async fn release(&self, gas_account_id: GasAccountId, amount: Decimal) -> Result<()> {
        self.mutate_account(gas_account_id, |acct| {
            acct.locked_total = (acct.locked_total - amount).max(Decimal::ZERO);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Versioned read-modify-write with bounded retry on write conflicts.
    async fn mutate_account<F>(&self, id: GasAccountId, mut apply: F) -> Result<GasAccount>
    where
        F: FnMut(&mut GasAccount) -> Result<()> + Send,
    {
        for _ in 0..UPDATE_RETRIES {
            let mut account = self.store.get_account(id).await?;
            apply(&mut account)?;
            account.updated_at = self.clock.now();
            match self.store.update_account(account).await {
                Ok(updated) => return Ok(updated),
                Err(StoreError::Conflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(GasBankError::Store(StoreError::Conflict(format!(
            "gas account {id} update contention"
        ))))
    }
}
