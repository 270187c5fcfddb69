//! Concurrency tests for the per-owner lock.
//!
//! Consumptions racing on one owner must never overdraw it, and every
//! committed change must end up in both the log and the materialized balance.
//! These need row locks and a pool with free connections, so they run only
//! against Postgres (TEST_DATABASE_URL).
use crate::common::{setup_locking_services, LOCKING_POOL_SIZE};
use credit_ledger::{
    config::LedgerConfig,
    error::StorageFailure,
    models::owner::Owner,
    services::{BalanceAggregator, CreditsService, LedgerStore},
    LedgerError,
};
use sea_orm::TransactionTrait;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{sync::Barrier, task::JoinSet};
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run only when TEST_DATABASE_URL points at Postgres
async fn test_two_concurrent_consumes_of_last_credit() {
    let services = setup_locking_services().await;
    let credits = services.credits.clone();
    let owner = Owner::User(Uuid::new_v4());
    credits.grant(owner, 1, None).await.unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let mut tasks = JoinSet::new();
    for _ in 0..2 {
        let credits = credits.clone();
        let barrier = barrier.clone();
        tasks.spawn(async move {
            barrier.wait().await;
            credits.consume(owner, 1, None).await
        });
    }

    let mut success_count = 0;
    let mut insufficient_count = 0;
    while let Some(result) = tasks.join_next().await {
        match result.expect("Task panicked") {
            Ok(_) => success_count += 1,
            Err(LedgerError::InsufficientCredits { .. }) => insufficient_count += 1,
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    assert_eq!(success_count, 1, "Expected exactly 1 successful consume");
    assert_eq!(insufficient_count, 1, "Expected 1 InsufficientCredits");
    assert_eq!(credits.balance_of(owner).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run only when TEST_DATABASE_URL points at Postgres
async fn test_concurrent_consumes_never_overdraw() {
    let services = setup_locking_services().await;
    let credits = services.credits.clone();
    let owner = Owner::User(Uuid::new_v4());
    credits.grant(owner, 3, None).await.unwrap();

    // Spawn 10 concurrent consumptions of 1 credit against a balance of 3
    let barrier = Arc::new(Barrier::new(10));
    let mut handles = vec![];
    for _ in 0..10 {
        let credits = credits.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            credits.consume(owner, 1, Some("race")).await
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientCredits { .. })))
        .count();

    assert_eq!(successes, 3, "Expected exactly 3 successful consumes: {:?}", results);
    assert_eq!(insufficient, 7, "Expected 7 InsufficientCredits errors: {:?}", results);
    assert_eq!(credits.balance_of(owner).await.unwrap(), 0);

    let audit = credits.audit(owner).await.unwrap();
    assert!(audit.is_consistent(), "Audit failed: {:?}", audit);
    assert_eq!(audit.transaction_count, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run only when TEST_DATABASE_URL points at Postgres
async fn test_interleaved_grants_and_consumes_match_log() {
    let services = setup_locking_services().await;
    let credits = services.credits.clone();
    let owner = Owner::Organization(Uuid::new_v4());
    credits.grant(owner, 5, None).await.unwrap();

    let writers = 2 * LOCKING_POOL_SIZE as usize;
    let barrier = Arc::new(Barrier::new(writers));
    let mut tasks = JoinSet::new();
    for i in 0..writers {
        let credits = credits.clone();
        let barrier = barrier.clone();
        tasks.spawn(async move {
            barrier.wait().await;
            if i % 2 == 0 {
                credits.grant(owner, 1, None).await.map(|_| 1i64)
            } else {
                credits.consume(owner, 2, None).await.map(|_| -2i64)
            }
        });
    }

    let mut committed_total = 5i64;
    while let Some(result) = tasks.join_next().await {
        match result.expect("Task panicked") {
            Ok(delta) => committed_total += delta,
            Err(LedgerError::InsufficientCredits { .. }) => {}
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    let balance = credits.balance_of(owner).await.unwrap();
    assert!(balance >= 0);
    assert_eq!(balance, committed_total);
    assert_eq!(credits.replay(owner).await.unwrap(), balance);
    assert!(credits.audit(owner).await.unwrap().is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run only when TEST_DATABASE_URL points at Postgres
async fn test_first_writes_for_new_owner_converge() {
    let services = setup_locking_services().await;
    let credits = services.credits.clone();
    let owner = Owner::User(Uuid::new_v4());

    // No balance row exists yet; all writers race to create it
    let barrier = Arc::new(Barrier::new(10));
    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let credits = credits.clone();
        let barrier = barrier.clone();
        tasks.spawn(async move {
            barrier.wait().await;
            credits.grant(owner, 1, None).await
        });
    }

    while let Some(result) = tasks.join_next().await {
        result
            .expect("Task panicked")
            .expect("Concurrent grant should succeed");
    }

    assert_eq!(credits.balance_of(owner).await.unwrap(), 10);

    let history = credits.history(owner).await.unwrap();
    let sequences: HashSet<i64> = history.iter().map(|tx| tx.sequence).collect();
    assert_eq!(sequences, (1..=10).collect::<HashSet<i64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run only when TEST_DATABASE_URL points at Postgres
async fn test_writer_times_out_on_owner_lock_with_free_connections() {
    let services = setup_locking_services().await;
    let owner = Owner::User(Uuid::new_v4());
    services.credits.grant(owner, 1, None).await.unwrap();

    let impatient = CreditsService::new(
        services.db.clone(),
        &LedgerConfig {
            operation_timeout_ms: 300,
        },
    );

    // Hold the owner's lock from another transaction
    let aggregator = BalanceAggregator::new(services.db.clone());
    let txn = services.db.begin().await.unwrap();
    aggregator.lock_for_update(&txn, owner).await.unwrap();

    // The pool is not exhausted: an unrelated owner goes straight through
    let bystander = Owner::User(Uuid::new_v4());
    impatient
        .grant(bystander, 1, None)
        .await
        .expect("Unrelated owner should not wait for the lock");

    let result = impatient.consume(owner, 1, None).await;
    assert!(
        matches!(
            result,
            Err(LedgerError::StorageUnavailable(StorageFailure::Timeout(_)))
        ),
        "Expected timeout on the owner lock, got {:?}",
        result
    );

    txn.rollback().await.unwrap();

    // The timed-out call left no trace and the lock is free again
    assert_eq!(services.credits.balance_of(owner).await.unwrap(), 1);
    services
        .credits
        .consume(owner, 1, None)
        .await
        .expect("Consume should succeed once the lock is released");
    assert_eq!(services.credits.balance_of(owner).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run only when TEST_DATABASE_URL points at Postgres
async fn test_waiting_consume_sees_balance_committed_by_lock_holder() {
    let services = setup_locking_services().await;
    let owner = Owner::Organization(Uuid::new_v4());
    services.credits.grant(owner, 1, None).await.unwrap();

    // Spend the last credit inside a transaction that stays open
    let aggregator = BalanceAggregator::new(services.db.clone());
    let store = LedgerStore::new(services.db.clone());
    let txn = services.db.begin().await.unwrap();
    let balance = aggregator.lock_for_update(&txn, owner).await.unwrap();
    let spent = store
        .append(&txn, owner, balance.last_sequence + 1, -1, Some("held"))
        .await
        .unwrap();
    aggregator.apply(&txn, balance, &spent).await.unwrap();

    let credits = services.credits.clone();
    let waiting = tokio::spawn(async move { credits.consume(owner, 1, None).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        !waiting.is_finished(),
        "Consume must wait for the owner lock"
    );

    txn.commit().await.unwrap();

    let result = waiting.await.expect("Task panicked");
    assert!(
        matches!(
            result,
            Err(LedgerError::InsufficientCredits { available: 0, .. })
        ),
        "Expected InsufficientCredits after the holder committed, got {:?}",
        result
    );
    assert_eq!(services.credits.balance_of(owner).await.unwrap(), 0);
    assert_eq!(services.credits.history(owner).await.unwrap().len(), 2);
}
