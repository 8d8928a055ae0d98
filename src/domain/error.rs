//! Gas Bank Error Taxonomy
//!
//! Validation and state-conflict errors surface synchronously to the
//! caller and are never retried. Resolver failures never appear here:
//! the poller absorbs them into attempts and, after exhaustion, a durable
//! `dead_letter` status.

use rust_decimal::Decimal;
use thiserror::Error;

use super::transaction::{TxId, TxStatus};
use crate::ports::store::StoreError;

/// Synchronous errors returned by the gas bank usecases.
#[derive(Debug, Error)]
pub enum GasBankError {
    #[error("invalid gas account configuration: {0}")]
    InvalidConfig(String),

    #[error("wallet address already assigned to another account")]
    WalletInUse,

    #[error("gas account is disabled")]
    AccountDisabled,

    #[error("duplicate deposit transaction {0}")]
    DuplicateTransaction(String),

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("daily withdrawal limit exceeded: limit {limit}, would use {would_use}")]
    DailyLimitExceeded { limit: Decimal, would_use: Decimal },

    #[error("transaction {0} is not pending approval")]
    TransactionNotPending(TxId),

    #[error("transaction {0} is already approved; votes are frozen")]
    AlreadyApproved(TxId),

    #[error("transaction {0} is not dead-lettered")]
    NotDeadLetter(TxId),

    #[error("transaction {0} is executing; retry the cancel once the attempt resolves")]
    CannotCancelExecuting(TxId),

    #[error("transaction {0} is terminal ({1}) and cannot change")]
    AlreadyTerminal(TxId, TxStatus),

    #[error("illegal status transition {from} -> {to} for transaction {id}")]
    InvalidTransition {
        id: TxId,
        from: TxStatus,
        to: TxStatus,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for usecase results.
pub type Result<T> = std::result::Result<T, GasBankError>;
