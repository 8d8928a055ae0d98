//! Gas Accounts — Balances, Reservations, Daily Windows
//!
//! A `GasAccount` custodies the GAS balance for one workspace account.
//! Balance and `locked_total` are only ever mutated by the `AccountLedger`
//! usecase; this module holds the pure arithmetic and the UTC-day window
//! bookkeeping.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::GasAccountId;

/// Per-workspace GAS custody account.
///
/// Accounts are never deleted, only disabled. `version` is the optimistic
/// concurrency guard the store checks on every update, so concurrent
/// deposits and reservations on the same account cannot lose writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasAccount {
    /// Gas account ID (assigned at ensure time).
    pub id: GasAccountId,
    /// Owning workspace account.
    pub account_id: String,
    /// Linked wallet address, lower-case hex.
    pub wallet_address: String,
    /// Floor the available balance may not drop below.
    pub min_balance: Decimal,
    /// Maximum committed withdrawals per UTC calendar day; zero = unlimited.
    pub daily_limit: Decimal,
    /// Distinct approvals a withdrawal needs before settlement.
    pub required_approvals: u32,
    /// Total custodied balance.
    pub balance: Decimal,
    /// Sum of outstanding withdrawal reservations.
    pub locked_total: Decimal,
    /// Withdrawal amounts committed within `daily_window`.
    pub daily_committed: Decimal,
    /// UTC day the `daily_committed` total belongs to.
    pub daily_window: NaiveDate,
    /// Disabled accounts reject deposits and withdrawals.
    pub enabled: bool,
    /// Optimistic concurrency version, bumped by the store on update.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl GasAccount {
    /// Create a fresh account with zeroed balances.
    pub fn new(
        account_id: String,
        wallet_address: String,
        min_balance: Decimal,
        daily_limit: Decimal,
        required_approvals: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            wallet_address,
            min_balance,
            daily_limit,
            required_approvals,
            balance: Decimal::ZERO,
            locked_total: Decimal::ZERO,
            daily_committed: Decimal::ZERO,
            daily_window: now.date_naive(),
            enabled: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance not held by outstanding reservations.
    pub fn available(&self) -> Decimal {
        self.balance - self.locked_total
    }

    /// Committed withdrawal total for the given UTC day.
    ///
    /// A stale window means no commit has happened today yet.
    pub fn daily_used(&self, day: NaiveDate) -> Decimal {
        if self.daily_window == day {
            self.daily_committed
        } else {
            Decimal::ZERO
        }
    }

    /// Roll the daily window forward and add a committed amount.
    pub fn record_commit(&mut self, amount: Decimal, day: NaiveDate) {
        if self.daily_window != day {
            self.daily_window = day;
            self.daily_committed = Decimal::ZERO;
        }
        self.daily_committed += amount;
    }
}

/// Normalize a wallet address to canonical lower-case hex.
///
/// Returns `None` for anything that is not `0x` + hex digits.
pub fn normalize_wallet_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_ascii_lowercase();
    let digits = lowered.strip_prefix("0x")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(lowered)
}
