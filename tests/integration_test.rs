//! Integration Tests - End-to-end Settlement Flows
//!
//! Exercises usecases against the in-memory store with a mocked
//! resolver. Uses mockall for trait mocking and tokio::test for async
//! tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use gasbank_engine::adapters::persistence::MemoryStore;
use gasbank_engine::domain::approval::{Decision, RejectPolicy};
use gasbank_engine::domain::clock::{Clock, ManualClock};
use gasbank_engine::domain::error::GasBankError;
use gasbank_engine::domain::transaction::{GasTransaction, TxStatus};
use gasbank_engine::ports::resolver::{Resolver, ResolverError, ResolverRef};
use gasbank_engine::ports::store::Store;
use gasbank_engine::usecases::approvals::ApprovalCollector;
use gasbank_engine::usecases::dead_letter::DeadLetterManager;
use gasbank_engine::usecases::ledger::AccountLedger;
use gasbank_engine::usecases::poller::{PollerSettings, SettlementPoller};
use gasbank_engine::usecases::withdrawals::WithdrawalService;

// ---- Mock Definitions ----

mock! {
    pub Res {}

    #[async_trait::async_trait]
    impl Resolver for Res {
        async fn execute(
            &self,
            tx: &GasTransaction,
        ) -> Result<ResolverRef, ResolverError>;

        async fn is_healthy(&self) -> bool;
    }
}

// ---- Harness ----

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    ledger: Arc<AccountLedger<MemoryStore, ManualClock>>,
    withdrawals: WithdrawalService<MemoryStore, ManualClock>,
    approvals: ApprovalCollector<MemoryStore, ManualClock>,
    dead_letters: DeadLetterManager<MemoryStore, ManualClock>,
}

fn harness() -> Harness {
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
    let dead_letters = DeadLetterManager::new(
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::clone(&clock),
        false,
    );
    Harness {
        store,
        clock,
        ledger,
        withdrawals,
        approvals,
        dead_letters,
    }
}

fn poller(
    h: &Harness,
    resolver: MockRes,
    max_attempts: u32,
) -> SettlementPoller<MemoryStore, MockRes, ManualClock> {
    SettlementPoller::new(
        Arc::clone(&h.store),
        Arc::new(resolver),
        Arc::clone(&h.ledger),
        Arc::clone(&h.clock),
        PollerSettings {
            max_attempts,
            ..PollerSettings::default()
        },
    )
}

// ---- Integration Tests ----

/// Deposit 10, withdraw 4 behind a 2-of-2 quorum and a daily limit of
/// 10, settle it, then verify a further 7 is over the remaining limit.
#[tokio::test]
async fn test_full_withdrawal_lifecycle_with_quorum_and_daily_limit() {
    let h = harness();
    let acct = h
        .ledger
        .ensure("workspace-1", "0xaa01", Decimal::ZERO, dec!(10), 2)
        .await
        .unwrap();
    h.ledger
        .deposit("workspace-1", acct.id, dec!(10), "neo-tx-1", "0xf", "0xaa01")
        .await
        .unwrap();

    let tx = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(4), "0xde57", None)
        .await
        .unwrap();
    assert_eq!(tx.status, TxStatus::PendingApproval);

    let first = h
        .approvals
        .submit(tx.id, "alice", Decision::Approve, "")
        .await
        .unwrap();
    assert!(!first.quorum_met);
    let second = h
        .approvals
        .submit(tx.id, "bob", Decision::Approve, "")
        .await
        .unwrap();
    assert_eq!(second.status, TxStatus::Queued);

    let mut resolver = MockRes::new();
    resolver
        .expect_execute()
        .times(1)
        .returning(|_| Ok("0xhash1".to_string()));
    let poller = poller(&h, resolver, 3);

    let report = poller.tick().await.unwrap();
    assert_eq!(report.executed, 1);

    let settled = h.store.get_transaction(tx.id).await.unwrap();
    assert_eq!(settled.status, TxStatus::Executed);
    assert_eq!(settled.resolver_ref.as_deref(), Some("0xhash1"));

    let acct = h.store.get_account(acct.id).await.unwrap();
    assert_eq!(acct.balance, dec!(6));
    assert_eq!(acct.locked_total, Decimal::ZERO);

    // 4 of today's 10 are spent; 7 more must be refused.
    let err = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(7), "0xde57", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GasBankError::DailyLimitExceeded { .. }));
}

/// The third failure of a max_attempts=3 budget dead-letters the
/// withdrawal (boundary is inclusive) and releases its reservation.
#[tokio::test]
async fn test_retry_budget_boundary_is_inclusive() {
    let h = harness();
    let acct = h
        .ledger
        .ensure("workspace-1", "0xaa01", Decimal::ZERO, dec!(100), 1)
        .await
        .unwrap();
    h.ledger
        .deposit("workspace-1", acct.id, dec!(20), "neo-tx-1", "0xf", "0xaa01")
        .await
        .unwrap();
    let tx = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(5), "0xde57", None)
        .await
        .unwrap();
    h.approvals
        .submit(tx.id, "alice", Decision::Approve, "")
        .await
        .unwrap();

    let mut resolver = MockRes::new();
    resolver
        .expect_execute()
        .times(3)
        .returning(|_| Err(ResolverError::Transport("rpc down".into())));
    let poller = poller(&h, resolver, 3);

    for _ in 0..2 {
        let report = poller.tick().await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.dead_lettered, 0);
        h.clock.advance(chrono::Duration::hours(2));
    }
    let report = poller.tick().await.unwrap();
    assert_eq!(report.dead_lettered, 1);

    let stored = h.store.get_transaction(tx.id).await.unwrap();
    assert_eq!(stored.status, TxStatus::DeadLetter);
    assert_eq!(stored.attempts, 3);

    let acct = h.store.get_account(acct.id).await.unwrap();
    assert_eq!(acct.balance, dec!(20));
    assert_eq!(acct.locked_total, Decimal::ZERO);
}

/// A resolver timeout burns an attempt without debiting the balance.
#[tokio::test]
async fn test_timeout_never_becomes_a_phantom_success() {
    let h = harness();
    let acct = h
        .ledger
        .ensure("workspace-1", "0xaa01", Decimal::ZERO, dec!(100), 1)
        .await
        .unwrap();
    h.ledger
        .deposit("workspace-1", acct.id, dec!(20), "neo-tx-1", "0xf", "0xaa01")
        .await
        .unwrap();
    let tx = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(5), "0xde57", None)
        .await
        .unwrap();
    h.approvals
        .submit(tx.id, "alice", Decision::Approve, "")
        .await
        .unwrap();

    let mut resolver = MockRes::new();
    resolver
        .expect_execute()
        .times(1)
        .returning(|_| Err(ResolverError::Timeout));
    let poller = poller(&h, resolver, 3);

    let report = poller.tick().await.unwrap();
    assert_eq!(report.executed, 0);
    assert_eq!(report.retried, 1);

    let stored = h.store.get_transaction(tx.id).await.unwrap();
    assert_eq!(stored.status, TxStatus::Queued);
    assert!(stored.resolver_ref.is_none());

    let acct = h.store.get_account(acct.id).await.unwrap();
    assert_eq!(acct.balance, dec!(20));
    assert_eq!(acct.locked_total, dec!(5));
}

/// Many concurrent claimers; the store's compare-and-set lets exactly
/// one through.
#[tokio::test]
async fn test_concurrent_claims_have_a_single_winner() {
    let h = harness();
    let acct = h
        .ledger
        .ensure("workspace-1", "0xaa01", Decimal::ZERO, dec!(100), 1)
        .await
        .unwrap();
    h.ledger
        .deposit("workspace-1", acct.id, dec!(20), "neo-tx-1", "0xf", "0xaa01")
        .await
        .unwrap();
    let tx = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(5), "0xde57", None)
        .await
        .unwrap();
    h.approvals
        .submit(tx.id, "alice", Decision::Approve, "")
        .await
        .unwrap();

    let mut claims = Vec::new();
    for _ in 0..16 {
        let store = Arc::clone(&h.store);
        let now = h.clock.now();
        claims.push(tokio::spawn(async move {
            store
                .transition(tx.id, TxStatus::Queued, TxStatus::Executing, now)
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for claim in claims {
        if claim.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

/// Replayed deposit notifications credit exactly once.
#[tokio::test]
async fn test_deposit_idempotency_across_replays() {
    let h = harness();
    let acct = h
        .ledger
        .ensure("workspace-1", "0xaa01", Decimal::ZERO, dec!(100), 1)
        .await
        .unwrap();

    h.ledger
        .deposit("workspace-1", acct.id, dec!(7), "neo-tx-1", "0xf", "0xaa01")
        .await
        .unwrap();
    for _ in 0..3 {
        let err = h
            .ledger
            .deposit("workspace-1", acct.id, dec!(7), "neo-tx-1", "0xf", "0xaa01")
            .await
            .unwrap_err();
        assert!(matches!(err, GasBankError::DuplicateTransaction(_)));
    }

    let acct = h.store.get_account(acct.id).await.unwrap();
    assert_eq!(acct.balance, dec!(7));
}

/// Cancel releases the reservation before execution and is refused once
/// a claim is in flight.
#[tokio::test]
async fn test_cancel_rules_around_execution() {
    let h = harness();
    let acct = h
        .ledger
        .ensure("workspace-1", "0xaa01", Decimal::ZERO, dec!(100), 1)
        .await
        .unwrap();
    h.ledger
        .deposit("workspace-1", acct.id, dec!(20), "neo-tx-1", "0xf", "0xaa01")
        .await
        .unwrap();

    // Queued withdrawal cancels cleanly.
    let tx = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(5), "0xde57", None)
        .await
        .unwrap();
    h.approvals
        .submit(tx.id, "alice", Decision::Approve, "")
        .await
        .unwrap();
    let cancelled = h
        .withdrawals
        .cancel("workspace-1", tx.id, "operator request")
        .await
        .unwrap();
    assert_eq!(cancelled.status, TxStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("operator request"));
    let acct_row = h.store.get_account(acct.id).await.unwrap();
    assert_eq!(acct_row.locked_total, Decimal::ZERO);

    // An executing withdrawal cannot be cancelled.
    let tx = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(5), "0xde57", None)
        .await
        .unwrap();
    h.approvals
        .submit(tx.id, "alice", Decision::Approve, "")
        .await
        .unwrap();
    assert!(h
        .store
        .transition(tx.id, TxStatus::Queued, TxStatus::Executing, h.clock.now())
        .await
        .unwrap());
    let err = h
        .withdrawals
        .cancel("workspace-1", tx.id, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, GasBankError::CannotCancelExecuting(_)));

    // Terminal statuses report AlreadyTerminal.
    assert!(h
        .store
        .transition(tx.id, TxStatus::Executing, TxStatus::Executed, h.clock.now())
        .await
        .unwrap());
    let err = h
        .withdrawals
        .cancel("workspace-1", tx.id, "way too late")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GasBankError::AlreadyTerminal(_, TxStatus::Executed)
    ));
}

/// Dead letters can be retried back through settlement or discarded.
#[tokio::test]
async fn test_dead_letter_retry_settles_on_recovered_resolver() {
    let h = harness();
    let acct = h
        .ledger
        .ensure("workspace-1", "0xaa01", Decimal::ZERO, dec!(100), 1)
        .await
        .unwrap();
    h.ledger
        .deposit("workspace-1", acct.id, dec!(20), "neo-tx-1", "0xf", "0xaa01")
        .await
        .unwrap();
    let tx = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(5), "0xde57", None)
        .await
        .unwrap();
    h.approvals
        .submit(tx.id, "alice", Decision::Approve, "")
        .await
        .unwrap();

    // One attempt budget, failing resolver: straight to dead letter.
    let mut failing = MockRes::new();
    failing
        .expect_execute()
        .times(1)
        .returning(|_| Err(ResolverError::Transport("rpc down".into())));
    let report = poller(&h, failing, 1).tick().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(h.dead_letters.list("workspace-1").await.unwrap().len(), 1);

    // Operator retries; the resolver has recovered. attempts (1) already
    // equals the budget, so reset_attempts=true is what makes the retry
    // meaningful here — use a manager configured for it.
    let resetting = DeadLetterManager::new(
        Arc::clone(&h.store),
        Arc::clone(&h.ledger),
        Arc::clone(&h.clock),
        true,
    );
    let requeued = resetting.retry(tx.id).await.unwrap();
    assert_eq!(requeued.status, TxStatus::Queued);
    assert_eq!(requeued.attempts, 0);

    let mut recovered = MockRes::new();
    recovered
        .expect_execute()
        .times(1)
        .returning(|_| Ok("0xhash2".to_string()));
    let report = poller(&h, recovered, 1).tick().await.unwrap();
    assert_eq!(report.executed, 1);

    let acct = h.store.get_account(acct.id).await.unwrap();
    assert_eq!(acct.balance, dec!(15));
    assert_eq!(acct.locked_total, Decimal::ZERO);
}

/// The account summary groups withdrawals into pending and dead-letter
/// buckets and mirrors the ledger balances.
#[tokio::test]
async fn test_account_summary_rolls_up_mixed_statuses() {
    let h = harness();
    let acct = h
        .ledger
        .ensure("workspace-1", "0xaa01", Decimal::ZERO, dec!(100), 1)
        .await
        .unwrap();
    h.ledger
        .deposit("workspace-1", acct.id, dec!(50), "neo-tx-1", "0xf", "0xaa01")
        .await
        .unwrap();

    // Queued (approved, immediate).
    let queued = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(5), "0xde57", None)
        .await
        .unwrap();
    h.approvals
        .submit(queued.id, "alice", Decision::Approve, "")
        .await
        .unwrap();

    // Scheduled for later today.
    let at = h.clock.now() + chrono::Duration::hours(4);
    h.withdrawals
        .withdraw("workspace-1", acct.id, dec!(3), "0xde57", Some(at))
        .await
        .unwrap();

    // Dead-lettered: walked through a failed claim, reservation released.
    let doomed = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(2), "0xde57", None)
        .await
        .unwrap();
    h.approvals
        .submit(doomed.id, "alice", Decision::Approve, "")
        .await
        .unwrap();
    assert!(h
        .store
        .transition(doomed.id, TxStatus::Queued, TxStatus::Executing, h.clock.now())
        .await
        .unwrap());
    assert!(h
        .store
        .transition(doomed.id, TxStatus::Executing, TxStatus::DeadLetter, h.clock.now())
        .await
        .unwrap());
    h.ledger.release(acct.id, dec!(2)).await.unwrap();

    // Cancelled withdrawals drop out of every bucket.
    let abandoned = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(1), "0xde57", None)
        .await
        .unwrap();
    h.withdrawals
        .cancel("workspace-1", abandoned.id, "operator request")
        .await
        .unwrap();

    let summary = h.withdrawals.summary("workspace-1").await.unwrap();
    assert_eq!(summary.gas_account_id, acct.id);
    assert_eq!(summary.balance, dec!(50));
    assert_eq!(summary.locked_total, dec!(8));
    assert_eq!(summary.available, dec!(42));
    assert_eq!(summary.pending_withdrawals, 2);
    assert_eq!(summary.pending_amount, dec!(8));
    assert_eq!(summary.dead_letters, 1);
}

/// A schedule in the future defers the whole pipeline until it passes.
#[tokio::test]
async fn test_scheduled_withdrawal_end_to_end() {
    let h = harness();
    let acct = h
        .ledger
        .ensure("workspace-1", "0xaa01", Decimal::ZERO, dec!(100), 1)
        .await
        .unwrap();
    h.ledger
        .deposit("workspace-1", acct.id, dec!(20), "neo-tx-1", "0xf", "0xaa01")
        .await
        .unwrap();

    let at = h.clock.now() + chrono::Duration::hours(6);
    let tx = h
        .withdrawals
        .withdraw("workspace-1", acct.id, dec!(5), "0xde57", Some(at))
        .await
        .unwrap();
    assert_eq!(tx.status, TxStatus::Scheduled);

    let mut resolver = MockRes::new();
    resolver
        .expect_execute()
        .times(1)
        .returning(|_| Ok("0xhash3".to_string()));
    let poller = poller(&h, resolver, 3);

    // Before the schedule: untouched.
    poller.tick().await.unwrap();
    assert_eq!(
        h.store.get_transaction(tx.id).await.unwrap().status,
        TxStatus::Scheduled
    );

    h.clock.advance(chrono::Duration::hours(6));
    // Tick 1 promotes to PendingApproval; the quorum gate still applies.
    poller.tick().await.unwrap();
    assert_eq!(
        h.store.get_transaction(tx.id).await.unwrap().status,
        TxStatus::PendingApproval
    );
    h.approvals
        .submit(tx.id, "alice", Decision::Approve, "")
        .await
        .unwrap();
    let report = poller.tick().await.unwrap();
    assert_eq!(report.executed, 1);
}
