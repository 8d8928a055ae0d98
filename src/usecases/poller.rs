//! Settlement Poller - Background Settlement of Queued Withdrawals
//!
//! Each tick walks the pipeline front to back: reclaim claims abandoned by
//! a crashed run, promote schedule-due withdrawals, queue approved ones,
//! then claim and settle what is eligible. The claim is an atomic
//! `Queued -> Executing` transition at the store, so replicas never settle
//! the same withdrawal twice.
//!
//! Resolver timeouts are indeterminate: the transfer may or may not have
//! landed. They burn an attempt and retry like any failure; the poller
//! never fabricates a success out of silence.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::domain::attempt::{retry_backoff, AttemptResult, SettlementAttempt};
use crate::domain::clock::Clock;
use crate::domain::error::Result;
use crate::domain::transaction::{GasTransaction, TxKind, TxStatus};
use crate::ports::resolver::{Resolver, ResolverError};
use crate::ports::store::{Store, TxFilter};

use super::ledger::AccountLedger;

/// Tunables for the settlement loop.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Sleep between ticks.
    pub poll_interval: Duration,
    /// Attempts before a withdrawal is dead-lettered (inclusive).
    pub max_attempts: u32,
    /// Deadline on each resolver call.
    pub resolver_timeout: Duration,
    /// Base delay for the exponential retry backoff.
    pub retry_base_delay: Duration,
    /// Age after which an `Executing` claim counts as abandoned.
    pub claim_staleness: Duration,
    /// Maximum rows pulled per pipeline step per tick.
    pub batch_limit: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            max_attempts: 3,
            resolver_timeout: Duration::from_secs(30),
            retry_base_delay: Duration::from_secs(30),
            claim_staleness: Duration::from_secs(300),
            batch_limit: 50,
        }
    }
}

/// What one tick did, for logs and metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    /// Stale `Executing` claims returned to the queue.
    pub reclaimed: u64,
    /// `Scheduled` withdrawals promoted to `PendingApproval`.
    pub promoted: u64,
    /// `Approved` withdrawals moved to `Queued`.
    pub queued: u64,
    /// Claims won this tick.
    pub claimed: u64,
    /// Settlements confirmed by the resolver.
    pub executed: u64,
    /// Failures rescheduled with backoff.
    pub retried: u64,
    /// Withdrawals quarantined after the last attempt.
    pub dead_lettered: u64,
    /// `Queued` rows remaining after the tick.
    pub queue_depth: u64,
}

enum SettleOutcome {
    Executed,
    Retried,
    DeadLettered,
    /// The claim was reclaimed while the resolver call was in flight;
    /// whoever holds it now owns the outcome.
    ClaimLost,
}

/// Background settlement loop. One instance per process; multiple
/// processes coordinate through the store's claim transition.
pub struct SettlementPoller<S: Store, R: Resolver, C: Clock> {
    store: Arc<S>,
    resolver: Arc<R>,
    ledger: Arc<AccountLedger<S, C>>,
    clock: Arc<C>,
    settings: PollerSettings,
}

impl<S: Store, R: Resolver, C: Clock> SettlementPoller<S, R, C> {
    pub fn new(
        store: Arc<S>,
        resolver: Arc<R>,
        ledger: Arc<AccountLedger<S, C>>,
        clock: Arc<C>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            store,
            resolver,
            ledger,
            clock,
            settings,
        }
    }

    /// Run ticks until the shutdown signal fires. `on_tick` receives every
    /// completed tick's report (the metrics adapter hangs off this).
    pub async fn run<F>(&self, mut shutdown: broadcast::Receiver<()>, mut on_tick: F)
    where
        F: FnMut(&TickReport) + Send,
    {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            max_attempts = self.settings.max_attempts,
            "settlement poller started"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("settlement poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) => on_tick(&report),
                        Err(err) => error!(error = %err, "settlement tick failed"),
                    }
                }
            }
        }
    }

    /// One full pipeline pass.
    pub async fn tick(&self) -> Result<TickReport> {
        let mut report = TickReport::default();
        let now = self.clock.now();

        report.reclaimed = self.reclaim_stale(now).await?;
        report.promoted = self
            .advance_due(TxStatus::Scheduled, TxStatus::PendingApproval, now)
            .await?;
        report.queued = self
            .advance_due(TxStatus::Approved, TxStatus::Queued, now)
            .await?;

        let claimable = self
            .store
            .list_claimable(now, self.settings.batch_limit)
            .await?;
        for tx in claimable {
            if !self
                .store
                .transition(tx.id, TxStatus::Queued, TxStatus::Executing, self.clock.now())
                .await?
            {
                // Another replica got there first.
                continue;
            }
            report.claimed += 1;
            // Settle the fresh row, not the listed snapshot: another
            // replica may have settled and requeued it in between, and
            // attempt numbering must come from the current state.
            let tx = self.store.get_transaction(tx.id).await?;
            match self.settle_one(tx).await? {
                SettleOutcome::Executed => report.executed += 1,
                SettleOutcome::Retried => report.retried += 1,
                SettleOutcome::DeadLettered => report.dead_lettered += 1,
                SettleOutcome::ClaimLost => {}
            }
        }

        report.queue_depth = self
            .store
            .list_transactions(TxFilter {
                gas_account_id: None,
                kind: Some(TxKind::Withdrawal),
                status: Some(TxStatus::Queued),
                limit: 0,
            })
            .await?
            .len() as u64;

        debug!(
            reclaimed = report.reclaimed,
            promoted = report.promoted,
            queued = report.queued,
            claimed = report.claimed,
            executed = report.executed,
            retried = report.retried,
            dead_lettered = report.dead_lettered,
            queue_depth = report.queue_depth,
            "settlement tick complete"
        );
        Ok(report)
    }

    /// Return claims whose holder stopped heartbeating to the queue.
    async fn reclaim_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        let staleness = chrono::Duration::from_std(self.settings.claim_staleness)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let stale = self.store.list_stale_executing(now - staleness).await?;
        let mut reclaimed = 0;
        for tx in stale {
            if self
                .store
                .transition(tx.id, TxStatus::Executing, TxStatus::Queued, now)
                .await?
            {
                warn!(
                    transaction_id = %tx.id,
                    attempts = tx.attempts,
                    "reclaimed abandoned settlement claim"
                );
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    /// Move schedule-due withdrawals from one status to the next.
    async fn advance_due(
        &self,
        from: TxStatus,
        to: TxStatus,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let due = self
            .store
            .list_due(from, now, self.settings.batch_limit)
            .await?;
        let mut moved = 0;
        for tx in due {
            if self.store.transition(tx.id, from, to, now).await? {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Settle one claimed withdrawal. The claim is already held; every
    /// path out of here releases it through a transition.
    async fn settle_one(&self, tx: GasTransaction) -> Result<SettleOutcome> {
        let attempt_number = tx.attempts + 1;
        let started_at = self.clock.now();
        let outcome =
            tokio::time::timeout(self.settings.resolver_timeout, self.resolver.execute(&tx))
                .await;
        let finished_at = self.clock.now();

        match outcome {
            Ok(Ok(resolver_ref)) => {
                self.finish_success(tx, attempt_number, started_at, finished_at, resolver_ref)
                    .await
            }
            Ok(Err(err)) => {
                let result = match err {
                    ResolverError::Timeout => AttemptResult::Timeout,
                    _ => AttemptResult::Fail,
                };
                self.finish_failure(
                    tx,
                    attempt_number,
                    started_at,
                    finished_at,
                    result,
                    err.to_string(),
                )
                .await
            }
            Err(_elapsed) => {
                self.finish_failure(
                    tx,
                    attempt_number,
                    started_at,
                    finished_at,
                    AttemptResult::Timeout,
                    format!(
                        "resolver deadline of {:?} elapsed",
                        self.settings.resolver_timeout
                    ),
                )
                .await
            }
        }
    }

    async fn finish_success(
        &self,
        mut tx: GasTransaction,
        attempt_number: u32,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        resolver_ref: String,
    ) -> Result<SettleOutcome> {
        // Confirm the claim is still ours before any money moves or any
        // attempt is logged. If the claim went stale and was reclaimed,
        // the winner already owns the row; committing here again would
        // double-debit the balance.
        if !self
            .store
            .transition(tx.id, TxStatus::Executing, TxStatus::Executed, finished_at)
            .await?
        {
            warn!(
                transaction_id = %tx.id,
                resolver_ref = %resolver_ref,
                "settlement claim lost mid-attempt, discarding result"
            );
            return Ok(SettleOutcome::ClaimLost);
        }

        self.store
            .append_attempt(SettlementAttempt {
                transaction_id: tx.id,
                attempt_number,
                started_at,
                finished_at,
                result: AttemptResult::Success,
                error: None,
                resolver_ref: Some(resolver_ref.clone()),
            })
            .await?;

        // The transfer is already confirmed on chain; a ledger hiccup here
        // must not resurrect the withdrawal.
        if let Err(err) = self.ledger.commit(tx.gas_account_id, tx.amount).await {
            error!(
                transaction_id = %tx.id,
                gas_account_id = %tx.gas_account_id,
                error = %err,
                "settled withdrawal but failed to commit ledger reservation"
            );
        }

        tx.attempts = attempt_number;
        tx.resolver_ref = Some(resolver_ref);
        tx.last_error = None;
        tx.not_before = None;
        self.store.update_transaction(tx.clone()).await?;

        info!(
            transaction_id = %tx.id,
            amount = %tx.amount,
            attempts = attempt_number,
            "gas withdrawal settled"
        );
        Ok(SettleOutcome::Executed)
    }

    async fn finish_failure(
        &self,
        mut tx: GasTransaction,
        attempt_number: u32,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        result: AttemptResult,
        message: String,
    ) -> Result<SettleOutcome> {
        // Same claim-ownership rule as the success path: the transition
        // out of `Executing` decides who owns the outcome. Losing it
        // means another replica reclaimed the row; recording the failure
        // on top of its state would corrupt the attempt log and release
        // a reservation it may have committed.
        let next = if attempt_number >= self.settings.max_attempts {
            TxStatus::DeadLetter
        } else {
            TxStatus::Queued
        };
        if !self
            .store
            .transition(tx.id, TxStatus::Executing, next, finished_at)
            .await?
        {
            warn!(
                transaction_id = %tx.id,
                error = %message,
                "settlement claim lost mid-attempt, discarding failure"
            );
            return Ok(SettleOutcome::ClaimLost);
        }

        self.store
            .append_attempt(SettlementAttempt {
                transaction_id: tx.id,
                attempt_number,
                started_at,
                finished_at,
                result,
                error: Some(message.clone()),
                resolver_ref: None,
            })
            .await?;

        tx.attempts = attempt_number;
        tx.last_error = Some(message.clone());

        if next == TxStatus::DeadLetter {
            tx.not_before = None;
            self.store.update_transaction(tx.clone()).await?;
            self.ledger.release(tx.gas_account_id, tx.amount).await?;
            warn!(
                transaction_id = %tx.id,
                attempts = attempt_number,
                error = %message,
                "gas withdrawal dead-lettered"
            );
            return Ok(SettleOutcome::DeadLettered);
        }

        let delay = retry_backoff(self.settings.retry_base_delay, attempt_number);
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
        tx.not_before = Some(finished_at + delay);
        self.store.update_transaction(tx.clone()).await?;

        debug!(
            transaction_id = %tx.id,
            attempts = attempt_number,
            result = %result,
            not_before = ?tx.not_before,
            "gas withdrawal settlement failed, retry scheduled"
        );
        Ok(SettleOutcome::Retried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::memory::MemoryStore;
    use crate::domain::approval::{Decision, RejectPolicy};
    use crate::domain::clock::ManualClock;
    use crate::ports::resolver::ResolverRef;
    use crate::usecases::approvals::ApprovalCollector;
    use crate::usecases::withdrawals::WithdrawalService;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Resolver test double that replays a scripted outcome sequence.
    struct ScriptedResolver {
        script: Mutex<VecDeque<std::result::Result<ResolverRef, ResolverError>>>,
    }

    impl ScriptedResolver {
        fn new(
            script: Vec<std::result::Result<ResolverRef, ResolverError>>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl Resolver for ScriptedResolver {
        async fn execute(
            &self,
            _tx: &GasTransaction,
        ) -> std::result::Result<ResolverRef, ResolverError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ResolverError::Transport("script exhausted".into())))
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        poller: SettlementPoller<MemoryStore, ScriptedResolver, ManualClock>,
    }

    async fn setup(
        script: Vec<std::result::Result<ResolverRef, ResolverError>>,
        settings: PollerSettings,
    ) -> (Harness, GasTransaction) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let ledger = Arc::new(AccountLedger::new(Arc::clone(&store), Arc::clone(&clock)));
        let withdrawals =
            WithdrawalService::new(Arc::clone(&store), Arc::clone(&ledger), Arc::clone(&clock));
        let approvals = ApprovalCollector::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&clock),
            RejectPolicy::Cancel,
        );
        let poller = SettlementPoller::new(
            Arc::clone(&store),
            Arc::new(ScriptedResolver::new(script)),
            Arc::clone(&ledger),
            Arc::clone(&clock),
            settings,
        );

        let acct = ledger
            .ensure("acct-1", "0xaa", Decimal::ZERO, dec!(100), 1)
            .await
            .unwrap();
        ledger
            .deposit("acct-1", acct.id, dec!(50), "t1", "0xf", "0xaa")
            .await
            .unwrap();
        let tx = withdrawals
            .withdraw("acct-1", acct.id, dec!(4), "0xde57", None)
            .await
            .unwrap();
        approvals
            .submit(tx.id, "alice", Decision::Approve, "")
            .await
            .unwrap();

        let harness = Harness {
            store,
            clock,
            poller,
        };
        (harness, tx)
    }

    fn fast_settings() -> PollerSettings {
        PollerSettings {
            retry_base_delay: Duration::from_secs(30),
            max_attempts: 3,
            ..PollerSettings::default()
        }
    }

    #[tokio::test]
    async fn test_tick_settles_queued_withdrawal() {
        let (h, tx) = setup(vec![Ok("ref-1".into())], fast_settings()).await;

        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.executed, 1);
        assert_eq!(report.queue_depth, 0);

        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::Executed);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.resolver_ref.as_deref(), Some("ref-1"));

        let acct = h.store.get_account(tx.gas_account_id).await.unwrap();
        assert_eq!(acct.balance, dec!(46));
        assert_eq!(acct.locked_total, Decimal::ZERO);

        let attempts = h.store.list_attempts(tx.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].result, AttemptResult::Success);
    }

    #[tokio::test]
    async fn test_failure_schedules_backoff_retry() {
        let (h, tx) = setup(
            vec![
                Err(ResolverError::Transport("rpc down".into())),
                Ok("ref-2".into()),
            ],
            fast_settings(),
        )
        .await;

        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.retried, 1);
        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::Queued);
        assert_eq!(stored.attempts, 1);
        assert!(stored.not_before.unwrap() > h.clock.now());

        // Backoff gate still closed: nothing is claimable.
        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.claimed, 0);

        h.clock.advance(chrono::Duration::seconds(31));
        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.executed, 1);
        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::Executed);
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_dead_letter_and_release() {
        let (h, tx) = setup(
            vec![
                Err(ResolverError::Transport("rpc down".into())),
                Err(ResolverError::Rejected("bad method".into())),
                Err(ResolverError::Transport("rpc down".into())),
            ],
            fast_settings(),
        )
        .await;

        for _ in 0..3 {
            h.poller.tick().await.unwrap();
            h.clock.advance(chrono::Duration::hours(2));
        }

        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::DeadLetter);
        assert_eq!(stored.attempts, 3);
        assert!(stored.last_error.is_some());

        // The reservation is released so the balance is spendable again.
        let acct = h.store.get_account(tx.gas_account_id).await.unwrap();
        assert_eq!(acct.balance, dec!(50));
        assert_eq!(acct.locked_total, Decimal::ZERO);

        let attempts = h.store.list_attempts(tx.id).await.unwrap();
        assert_eq!(attempts.len(), 3);
    }

    #[tokio::test]
    async fn test_resolver_timeout_is_a_failure_not_success() {
        let (h, tx) = setup(vec![Err(ResolverError::Timeout)], fast_settings()).await;

        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.executed, 0);
        assert_eq!(report.retried, 1);

        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::Queued);
        assert!(stored.resolver_ref.is_none());

        let attempts = h.store.list_attempts(tx.id).await.unwrap();
        assert_eq!(attempts[0].result, AttemptResult::Timeout);

        // Balance untouched until a confirmed settlement.
        let acct = h.store.get_account(tx.gas_account_id).await.unwrap();
        assert_eq!(acct.balance, dec!(50));
        assert_eq!(acct.locked_total, dec!(4));
    }

    #[tokio::test]
    async fn test_scheduled_promotion_waits_for_schedule_time() {
        let (h, _) = setup(vec![Ok("ref-1".into())], fast_settings()).await;
        let acct = h.store.find_account_by_owner("acct-1").await.unwrap().unwrap();
        let ledger = AccountLedger::new(Arc::clone(&h.store), Arc::clone(&h.clock));
        let withdrawals = WithdrawalService::new(
            Arc::clone(&h.store),
            Arc::new(ledger),
            Arc::clone(&h.clock),
        );

        let later = h.clock.now() + chrono::Duration::hours(3);
        let tx = withdrawals
            .withdraw("acct-1", acct.id, dec!(2), "0xde57", Some(later))
            .await
            .unwrap();

        h.poller.tick().await.unwrap();
        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::Scheduled);

        h.clock.advance(chrono::Duration::hours(3));
        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.promoted, 1);
        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::PendingApproval);
    }

    /// Resolver that parks inside `execute` until the test releases it,
    /// so a claim can go stale while the call is still in flight.
    struct GatedResolver {
        entered: Notify,
        release: Notify,
        reference: ResolverRef,
    }

    #[async_trait]
    impl Resolver for GatedResolver {
        async fn execute(
            &self,
            _tx: &GasTransaction,
        ) -> std::result::Result<ResolverRef, ResolverError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(self.reference.clone())
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    /// Two replicas over one store: replica A claims and stalls in the
    /// resolver, the claim goes stale, replica B reclaims and settles.
    /// A's late result must be discarded — one debit, one attempt
    /// record, B's reference on the row.
    #[tokio::test]
    async fn test_lost_claim_result_is_discarded_not_double_committed() {
        let settings = PollerSettings {
            claim_staleness: Duration::from_secs(60),
            resolver_timeout: Duration::from_secs(600),
            ..PollerSettings::default()
        };
        let (h, tx) = setup(vec![Ok("ref-b".into())], settings.clone()).await;

        let gate = Arc::new(GatedResolver {
            entered: Notify::new(),
            release: Notify::new(),
            reference: "ref-a".into(),
        });
        let ledger_a = Arc::new(AccountLedger::new(Arc::clone(&h.store), Arc::clone(&h.clock)));
        let replica_a = SettlementPoller::new(
            Arc::clone(&h.store),
            Arc::clone(&gate),
            ledger_a,
            Arc::clone(&h.clock),
            settings,
        );

        // Replica A wins the claim and hangs inside the resolver call.
        let a_tick = tokio::spawn(async move { replica_a.tick().await.unwrap() });
        gate.entered.notified().await;

        // The claim ages past staleness; replica B reclaims and settles.
        h.clock.advance(chrono::Duration::seconds(90));
        let b_report = h.poller.tick().await.unwrap();
        assert_eq!(b_report.reclaimed, 1);
        assert_eq!(b_report.executed, 1);

        // A's resolver finally answers, but its claim is gone.
        gate.release.notify_one();
        let a_report = a_tick.await.unwrap();
        assert_eq!(a_report.claimed, 1);
        assert_eq!(a_report.executed, 0);

        // The 4-GAS withdrawal debited exactly once.
        let acct = h.store.get_account(tx.gas_account_id).await.unwrap();
        assert_eq!(acct.balance, dec!(46));
        assert_eq!(acct.locked_total, Decimal::ZERO);

        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::Executed);
        assert_eq!(stored.resolver_ref.as_deref(), Some("ref-b"));

        let attempts = h.store.list_attempts(tx.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempt_number, 1);
        assert_eq!(attempts[0].result, AttemptResult::Success);
    }

    /// Same race on the failure path: a lost claim must not release the
    /// reservation the new holder went on to commit.
    #[tokio::test]
    async fn test_lost_claim_failure_does_not_release_committed_funds() {
        let settings = PollerSettings {
            claim_staleness: Duration::from_secs(60),
            resolver_timeout: Duration::from_secs(600),
            max_attempts: 1,
            ..PollerSettings::default()
        };
        let (h, tx) = setup(vec![Ok("ref-b".into())], settings.clone()).await;

        struct FailAfterGate {
            entered: Notify,
            release: Notify,
        }

        #[async_trait]
        impl Resolver for FailAfterGate {
            async fn execute(
                &self,
                _tx: &GasTransaction,
            ) -> std::result::Result<ResolverRef, ResolverError> {
                self.entered.notify_one();
                self.release.notified().await;
                Err(ResolverError::Transport("rpc down".into()))
            }

            async fn is_healthy(&self) -> bool {
                true
            }
        }

        let gate = Arc::new(FailAfterGate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let ledger_a = Arc::new(AccountLedger::new(Arc::clone(&h.store), Arc::clone(&h.clock)));
        let replica_a = SettlementPoller::new(
            Arc::clone(&h.store),
            Arc::clone(&gate),
            ledger_a,
            Arc::clone(&h.clock),
            settings,
        );

        let a_tick = tokio::spawn(async move { replica_a.tick().await.unwrap() });
        gate.entered.notified().await;

        h.clock.advance(chrono::Duration::seconds(90));
        let b_report = h.poller.tick().await.unwrap();
        assert_eq!(b_report.executed, 1);

        // With max_attempts = 1 this failure would have dead-lettered
        // and released, re-crediting funds the settlement already spent.
        gate.release.notify_one();
        let a_report = a_tick.await.unwrap();
        assert_eq!(a_report.dead_lettered, 0);
        assert_eq!(a_report.retried, 0);

        let acct = h.store.get_account(tx.gas_account_id).await.unwrap();
        assert_eq!(acct.balance, dec!(46));
        assert_eq!(acct.locked_total, Decimal::ZERO);

        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::Executed);

        let attempts = h.store.list_attempts(tx.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_executing_claim_is_reclaimed() {
        let (h, tx) = setup(
            vec![Err(ResolverError::Transport("rpc down".into())), Ok("ref-1".into())],
            fast_settings(),
        )
        .await;

        // Simulate a crashed holder: claim the row, then let it go stale.
        assert!(h
            .store
            .transition(tx.id, TxStatus::Queued, TxStatus::Executing, h.clock.now())
            .await
            .unwrap());

        h.clock.advance(chrono::Duration::minutes(10));
        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.reclaimed, 1);
        // The same tick re-claims and settles it (first scripted outcome
        // fails, so it lands back in the queue with an attempt burned).
        assert_eq!(report.claimed, 1);

        let stored = h.store.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.attempts, 1);
    }
}
