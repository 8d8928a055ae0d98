//! In-Memory Store - Reference `Store` Implementation
//!
//! Backs the engine in tests and single-process deployments. All state
//! lives behind one mutex; critical sections are short and never await,
//! so the async trait methods stay cheap.
//!
//! The two guarantees the usecases lean on are both enforced here:
//! `update_account` rejects stale versions with `Conflict`, and
//! `transition` applies the status compare-and-set under the lock, so
//! concurrent claimers see exactly one winner.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::account::GasAccount;
use crate::domain::approval::Approval;
use crate::domain::attempt::SettlementAttempt;
use crate::domain::transaction::{GasAccountId, GasTransaction, TxId, TxKind, TxStatus};
use crate::ports::store::{Store, StoreError, TxFilter};

#[derive(Default)]
struct Inner {
    accounts: HashMap<GasAccountId, GasAccount>,
    transactions: HashMap<TxId, GasTransaction>,
    /// Insertion order; listings walk it backwards for newest-first.
    tx_order: Vec<TxId>,
    approvals: HashMap<TxId, Vec<Approval>>,
    attempts: HashMap<TxId, Vec<SettlementAttempt>>,
    deposit_refs: HashSet<String>,
}

/// Mutex-guarded in-memory store.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_account(&self, account: GasAccount) -> Result<GasAccount, StoreError> {
        let mut inner = self.lock();
        if inner.accounts.contains_key(&account.id) {
            return Err(StoreError::Backend(format!(
                "gas account {} already exists",
                account.id
            )));
        }
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn update_account(&self, account: GasAccount) -> Result<GasAccount, StoreError> {
        let mut inner = self.lock();
        let stored = inner
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| StoreError::NotFound(format!("gas account {}", account.id)))?;
        if stored.version != account.version {
            return Err(StoreError::Conflict(format!(
                "gas account {} version {} != {}",
                account.id, account.version, stored.version
            )));
        }
        let mut account = account;
        account.version += 1;
        *stored = account.clone();
        Ok(account)
    }

    async fn get_account(&self, id: GasAccountId) -> Result<GasAccount, StoreError> {
        self.lock()
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("gas account {id}")))
    }

    async fn find_account_by_owner(
        &self,
        account_id: &str,
    ) -> Result<Option<GasAccount>, StoreError> {
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| a.account_id == account_id)
            .cloned())
    }

    async fn find_account_by_wallet(
        &self,
        wallet_address: &str,
    ) -> Result<Option<GasAccount>, StoreError> {
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| !a.wallet_address.is_empty() && a.wallet_address == wallet_address)
            .cloned())
    }

    async fn create_transaction(
        &self,
        tx: GasTransaction,
    ) -> Result<GasTransaction, StoreError> {
        let mut inner = self.lock();
        if inner.transactions.contains_key(&tx.id) {
            return Err(StoreError::Backend(format!(
                "transaction {} already exists",
                tx.id
            )));
        }
        inner.tx_order.push(tx.id);
        inner.transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn update_transaction(
        &self,
        tx: GasTransaction,
    ) -> Result<GasTransaction, StoreError> {
        let mut inner = self.lock();
        let stored = inner
            .transactions
            .get_mut(&tx.id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", tx.id)))?;
        // Status only moves through `transition`.
        let mut tx = tx;
        tx.status = stored.status;
        *stored = tx.clone();
        Ok(tx)
    }

    async fn get_transaction(&self, id: TxId) -> Result<GasTransaction, StoreError> {
        self.lock()
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))
    }

    async fn list_transactions(
        &self,
        filter: TxFilter,
    ) -> Result<Vec<GasTransaction>, StoreError> {
        let inner = self.lock();
        let limit = if filter.limit == 0 {
            usize::MAX
        } else {
            filter.limit
        };
        let matches = inner
            .tx_order
            .iter()
            .rev()
            .filter_map(|id| inner.transactions.get(id))
            .filter(|tx| {
                filter
                    .gas_account_id
                    .is_none_or(|id| tx.gas_account_id == id)
                    && filter.kind.is_none_or(|k| tx.kind == k)
                    && filter.status.is_none_or(|s| tx.status == s)
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn transition(
        &self,
        id: TxId,
        from: TxStatus,
        to: TxStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let stored = inner
            .transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))?;
        if stored.status != from || !TxStatus::can_transition(from, to) {
            return Ok(false);
        }
        stored.status = to;
        stored.updated_at = now;
        Ok(true)
    }

    async fn list_due(
        &self,
        status: TxStatus,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<GasTransaction>, StoreError> {
        let inner = self.lock();
        let limit = if limit == 0 { usize::MAX } else { limit };
        let due = inner
            .tx_order
            .iter()
            .filter_map(|id| inner.transactions.get(id))
            .filter(|tx| {
                tx.kind == TxKind::Withdrawal && tx.status == status && tx.schedule_due(now)
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(due)
    }

    async fn list_claimable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<GasTransaction>, StoreError> {
        let inner = self.lock();
        let limit = if limit == 0 { usize::MAX } else { limit };
        let claimable = inner
            .tx_order
            .iter()
            .filter_map(|id| inner.transactions.get(id))
            .filter(|tx| {
                tx.kind == TxKind::Withdrawal
                    && tx.status == TxStatus::Queued
                    && tx.not_before.is_none_or(|at| at <= now)
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(claimable)
    }

    async fn list_stale_executing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<GasTransaction>, StoreError> {
        let inner = self.lock();
        let stale = inner
            .tx_order
            .iter()
            .filter_map(|id| inner.transactions.get(id))
            .filter(|tx| tx.status == TxStatus::Executing && tx.updated_at < older_than)
            .cloned()
            .collect();
        Ok(stale)
    }

    async fn record_deposit_ref(&self, external_tx_id: &str) -> Result<bool, StoreError> {
        Ok(self.lock().deposit_refs.insert(external_tx_id.to_string()))
    }

    async fn upsert_approval(&self, approval: Approval) -> Result<Approval, StoreError> {
        let mut inner = self.lock();
        let rows = inner
            .approvals
            .entry(approval.transaction_id)
            .or_default();
        match rows.iter_mut().find(|a| a.approver == approval.approver) {
            Some(existing) => *existing = approval.clone(),
            None => rows.push(approval.clone()),
        }
        Ok(approval)
    }

    async fn list_approvals(&self, transaction_id: TxId) -> Result<Vec<Approval>, StoreError> {
        let mut rows = self
            .lock()
            .approvals
            .get(&transaction_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn append_attempt(
        &self,
        attempt: SettlementAttempt,
    ) -> Result<SettlementAttempt, StoreError> {
        self.lock()
            .attempts
            .entry(attempt.transaction_id)
            .or_default()
            .push(attempt.clone());
        Ok(attempt)
    }

    async fn list_attempts(
        &self,
        transaction_id: TxId,
    ) -> Result<Vec<SettlementAttempt>, StoreError> {
        let mut rows = self
            .lock()
            .attempts
            .get(&transaction_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|a| a.attempt_number);
        Ok(rows)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
