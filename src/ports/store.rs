//! Store Port - Durable Gas Bank State Interface
//!
//! Narrow interface over the storage engine (Postgres or in-memory).
//! Besides plain CRUD it exposes two primitives the settlement guarantees
//! hang on:
//!
//! - `transition`: an atomic compare-and-set on a transaction's status.
//!   The poller's claim is `transition(id, Queued, Executing)` — exactly
//!   one caller observes `true`, even across poller replicas, because the
//!   condition is evaluated at the store, not in process memory.
//! - versioned `update_account`: account rows carry a version counter and
//!   the store rejects stale writes with `Conflict`, so concurrent
//!   deposits/reservations on one account cannot lose updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::account::GasAccount;
use crate::domain::approval::Approval;
use crate::domain::attempt::SettlementAttempt;
use crate::domain::transaction::{GasAccountId, GasTransaction, TxId, TxKind, TxStatus};

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// Versioned write lost the race; reload and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Filter for transaction listings.
#[derive(Debug, Clone, Default)]
pub struct TxFilter {
    /// Restrict to one gas account.
    pub gas_account_id: Option<GasAccountId>,
    /// Restrict to deposits or withdrawals.
    pub kind: Option<TxKind>,
    /// Restrict to one status.
    pub status: Option<TxStatus>,
    /// Maximum rows returned (newest first); 0 = implementation default.
    pub limit: usize,
}

/// Durable storage for accounts, transactions, approvals, and attempts.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // ---- gas accounts ----

    /// Insert a new gas account.
    async fn create_account(&self, account: GasAccount) -> Result<GasAccount, StoreError>;

    /// Versioned update: fails with `Conflict` unless `account.version`
    /// matches the stored row; the stored version is bumped on success.
    async fn update_account(&self, account: GasAccount) -> Result<GasAccount, StoreError>;

    /// Fetch by gas account id.
    async fn get_account(&self, id: GasAccountId) -> Result<GasAccount, StoreError>;

    /// Fetch by owning workspace account, if one exists.
    async fn find_account_by_owner(
        &self,
        account_id: &str,
    ) -> Result<Option<GasAccount>, StoreError>;

    /// Fetch by normalized wallet address, if linked anywhere.
    async fn find_account_by_wallet(
        &self,
        wallet_address: &str,
    ) -> Result<Option<GasAccount>, StoreError>;

    // ---- transactions ----

    /// Insert a new transaction row.
    async fn create_transaction(&self, tx: GasTransaction)
        -> Result<GasTransaction, StoreError>;

    /// Overwrite non-status fields of a transaction (attempts, errors,
    /// backoff gate, resolver ref). Status moves only through
    /// `transition`.
    async fn update_transaction(&self, tx: GasTransaction)
        -> Result<GasTransaction, StoreError>;

    /// Fetch one transaction.
    async fn get_transaction(&self, id: TxId) -> Result<GasTransaction, StoreError>;

    /// List transactions newest first.
    async fn list_transactions(&self, filter: TxFilter)
        -> Result<Vec<GasTransaction>, StoreError>;

    /// Atomic conditional status transition.
    ///
    /// Returns `true` if the row was in `from` and is now in `to`;
    /// `false` if the row exists but was in another status. The winner's
    /// `updated_at` is set to `now` (claim liveness marker).
    async fn transition(
        &self,
        id: TxId,
        from: TxStatus,
        to: TxStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Withdrawals in `status` whose `schedule_at` is absent or `<= now`.
    async fn list_due(
        &self,
        status: TxStatus,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<GasTransaction>, StoreError>;

    /// Queued withdrawals whose `not_before` gate has passed.
    async fn list_claimable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<GasTransaction>, StoreError>;

    /// Executing rows whose `updated_at` is older than `older_than` —
    /// claims abandoned by a crashed poller, due for reclamation.
    async fn list_stale_executing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<GasTransaction>, StoreError>;

    /// Record an external deposit reference for idempotency.
    ///
    /// Returns `false` if the reference was already recorded.
    async fn record_deposit_ref(&self, external_tx_id: &str) -> Result<bool, StoreError>;

    // ---- approvals ----

    /// Insert or replace the approver's decision for a withdrawal.
    async fn upsert_approval(&self, approval: Approval) -> Result<Approval, StoreError>;

    /// List decisions for a withdrawal, ordered by `created_at`.
    async fn list_approvals(&self, transaction_id: TxId) -> Result<Vec<Approval>, StoreError>;

    // ---- settlement attempts ----

    /// Append an attempt to the audit log.
    async fn append_attempt(
        &self,
        attempt: SettlementAttempt,
    ) -> Result<SettlementAttempt, StoreError>;

    /// List attempts for a withdrawal, ordered by `attempt_number`.
    async fn list_attempts(
        &self,
        transaction_id: TxId,
    ) -> Result<Vec<SettlementAttempt>, StoreError>;

    /// Whether the backing store is reachable and writable.
    async fn is_healthy(&self) -> bool;
}
