//! Concurrency and atomicity tests for the transfer engine
//!
//! These tests drive the engine directly against a shared `MemoryLedger` from
//! many tokio tasks and check the ledger-wide guarantees:
//! - No lost updates under concurrent transfers between the same accounts
//! - No deadlock when transfers run in opposite directions
//! - All-or-nothing transactions under injected store failures
//! - Balance conservation and balances equal to the sum of entries
//! - Cancellation and deadlines leave no partial writes and no held locks

use async_trait::async_trait;
use bank_transfer_engine::core::{
    EngineConfig, FundsPolicy, LedgerStore, MemoryLedger, TransactionScope, TransferEngine,
};
use bank_transfer_engine::types::{
    Account, AccountId, Currency, Entry, ErrorKind, LedgerError, Transfer, TransferRequest,
};
use futures::future::BoxFuture;
use rstest::rstest;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn ledger_with(balances: &[(i64, Currency)]) -> Arc<MemoryLedger> {
    let ledger = Arc::new(MemoryLedger::new());
    for (i, (balance, currency)) in balances.iter().enumerate() {
        ledger
            .open_account(&format!("owner{}", i + 1), *currency, *balance)
            .unwrap();
    }
    ledger
}

fn memory_engine(ledger: &Arc<MemoryLedger>) -> TransferEngine<MemoryLedger> {
    TransferEngine::new(Arc::clone(ledger), EngineConfig::default())
}

fn assert_balances_match_entries(ledger: &MemoryLedger) {
    for account in ledger.list_accounts() {
        let posted: i64 = ledger
            .list_entries(account.id)
            .iter()
            .map(|entry| entry.amount)
            .sum();
        assert_eq!(
            account.balance, posted,
            "balance of account {} differs from its entries",
            account.id
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_lose_no_updates() {
    let ledger = ledger_with(&[(1000, Currency::Usd), (1000, Currency::Usd)]);
    let engine = memory_engine(&ledger);
    let entries_before = ledger.entry_count();

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.transfer(TransferRequest::new(1, 2, 100)).await })
        })
        .collect();

    let mut from_balances = BTreeSet::new();
    let mut to_balances = BTreeSet::new();
    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.transfer.amount, 100);
        assert_eq!(result.from_entry.amount, -100);
        assert_eq!(result.to_entry.amount, 100);
        from_balances.insert(result.from_account.balance);
        to_balances.insert(result.to_account.balance);
    }

    // Every transfer observed a different committed state
    assert_eq!(from_balances, BTreeSet::from([500, 600, 700, 800, 900]));
    assert_eq!(to_balances, BTreeSet::from([1100, 1200, 1300, 1400, 1500]));

    assert_eq!(ledger.get_account(1).unwrap().balance, 500);
    assert_eq!(ledger.get_account(2).unwrap().balance, 1500);
    assert_eq!(ledger.list_transfers_between(1, 2).len(), 5);
    assert_eq!(ledger.entry_count(), entries_before + 10);
    assert_balances_match_entries(&ledger);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_transfers_do_not_deadlock() {
    let ledger = ledger_with(&[(1000, Currency::Usd), (1000, Currency::Usd)]);
    let engine = memory_engine(&ledger);

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let engine = engine.clone();
            let request = if i % 2 == 0 {
                TransferRequest::new(1, 2, 10)
            } else {
                TransferRequest::new(2, 1, 10)
            };
            tokio::spawn(async move { engine.transfer(request).await })
        })
        .collect();

    let all = async {
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(10), all)
        .await
        .expect("transfers deadlocked");

    assert_eq!(ledger.get_account(1).unwrap().balance, 1000);
    assert_eq!(ledger.get_account(2).unwrap().balance, 1000);
    assert_eq!(ledger.transfer_count(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_balances_are_conserved_under_contention() {
    let ledger = ledger_with(&[
        (500, Currency::Eur),
        (500, Currency::Eur),
        (500, Currency::Eur),
        (500, Currency::Eur),
    ]);
    let engine = TransferEngine::new(
        Arc::clone(&ledger),
        EngineConfig::default().with_funds_policy(FundsPolicy::RequireSufficientFunds),
    );

    let tasks: Vec<_> = (0..200i64)
        .map(|i| {
            let engine = engine.clone();
            let from = i % 4 + 1;
            let to = (i * 7 + 1) % 4 + 1;
            let amount = i % 37 + 1;
            tokio::spawn(async move { engine.transfer(TransferRequest::new(from, to, amount)).await })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(
                matches!(e.kind(), ErrorKind::InsufficientFunds | ErrorKind::Validation),
                "unexpected error: {}",
                e
            ),
        }
    }

    let total: i64 = ledger.list_accounts().iter().map(|a| a.balance).sum();
    assert_eq!(total, 2000);
    assert!(ledger.list_accounts().iter().all(|a| a.balance >= 0));
    assert_eq!(ledger.transfer_count(), succeeded);
    assert_balances_match_entries(&ledger);
}

#[tokio::test]
async fn test_currency_mismatch_creates_no_rows() {
    let ledger = ledger_with(&[(1000, Currency::Usd), (1000, Currency::Vnd)]);
    let entries_before = ledger.entry_count();

    let err = memory_engine(&ledger)
        .transfer(TransferRequest::new(1, 2, 10))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CurrencyMismatch);
    assert_eq!(ledger.transfer_count(), 0);
    assert_eq!(ledger.entry_count(), entries_before);
    assert_eq!(ledger.get_account(1).unwrap().balance, 1000);
    assert_eq!(ledger.get_account(2).unwrap().balance, 1000);
}

#[tokio::test]
async fn test_result_matches_committed_rows() {
    let ledger = ledger_with(&[(300, Currency::Usd), (0, Currency::Usd)]);

    let result = memory_engine(&ledger)
        .transfer(TransferRequest::new(1, 2, 120))
        .await
        .unwrap();

    assert_eq!(ledger.get_transfer(result.transfer.id), Some(result.transfer.clone()));
    assert_eq!(ledger.get_entry(result.from_entry.id), Some(result.from_entry.clone()));
    assert_eq!(ledger.get_entry(result.to_entry.id), Some(result.to_entry.clone()));
    assert_eq!(ledger.get_account(1), Some(result.from_account.clone()));
    assert_eq!(ledger.get_account(2), Some(result.to_account.clone()));
    assert_eq!(result.from_account.balance, 180);
    assert_eq!(result.to_account.balance, 120);
}

/// Store wrapper whose n-th write fails
struct FaultyStore<'a> {
    inner: &'a mut dyn LedgerStore,
    writes: usize,
    fail_at: usize,
}

impl FaultyStore<'_> {
    fn write(&mut self) -> Result<(), LedgerError> {
        self.writes += 1;
        if self.writes == self.fail_at {
            Err(LedgerError::storage(format!("injected failure at write {}", self.writes)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerStore for FaultyStore<'_> {
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        self.inner.get_account_for_update(id).await
    }

    async fn update_account_balance(
        &mut self,
        id: AccountId,
        balance: i64,
    ) -> Result<Account, LedgerError> {
        self.write()?;
        self.inner.update_account_balance(id, balance).await
    }

    async fn create_entry(&mut self, account_id: AccountId, amount: i64) -> Result<Entry, LedgerError> {
        self.write()?;
        self.inner.create_entry(account_id, amount).await
    }

    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        self.write()?;
        self.inner
            .create_transfer(from_account_id, to_account_id, amount)
            .await
    }
}

/// Memory ledger whose transactions fail at a chosen write
struct FaultyScope {
    ledger: Arc<MemoryLedger>,
    fail_at: usize,
}

#[async_trait]
impl TransactionScope for FaultyScope {
    async fn run_in_transaction<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut dyn LedgerStore) -> BoxFuture<'s, Result<T, LedgerError>>
            + Send,
    {
        let mut tx = self.ledger.begin();
        let outcome = {
            let mut store = FaultyStore {
                inner: &mut tx,
                writes: 0,
                fail_at: self.fail_at,
            };
            work(&mut store).await
        };

        match outcome {
            Ok(value) => {
                tx.commit();
                Ok(value)
            }
            Err(error) => {
                tx.rollback();
                Err(error)
            }
        }
    }
}

#[rstest]
#[case::transfer_record(1)]
#[case::debit_entry(2)]
#[case::credit_entry(3)]
#[case::first_balance(4)]
#[case::second_balance(5)]
#[tokio::test]
async fn test_failed_write_rolls_back_everything(#[case] fail_at: usize) {
    let ledger = ledger_with(&[(1000, Currency::Usd), (1000, Currency::Usd)]);
    let entries_before = ledger.entry_count();
    let scope = Arc::new(FaultyScope {
        ledger: Arc::clone(&ledger),
        fail_at,
    });
    let engine = TransferEngine::new(scope, EngineConfig::default());

    let err = engine
        .transfer(TransferRequest::new(2, 1, 250))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LedgerError::storage(format!("injected failure at write {}", fail_at))
    );
    assert_eq!(ledger.transfer_count(), 0);
    assert_eq!(ledger.entry_count(), entries_before);
    assert_eq!(ledger.get_account(1).unwrap().balance, 1000);
    assert_eq!(ledger.get_account(2).unwrap().balance, 1000);

    // Locks were released by the rollback
    let result = memory_engine(&ledger)
        .transfer(TransferRequest::new(2, 1, 250))
        .await
        .unwrap();
    assert_eq!(result.to_account.balance, 1250);
}

#[tokio::test]
async fn test_transfer_without_injected_failure_commits() {
    let ledger = ledger_with(&[(1000, Currency::Usd), (1000, Currency::Usd)]);
    let scope = Arc::new(FaultyScope {
        ledger: Arc::clone(&ledger),
        fail_at: 6,
    });

    TransferEngine::new(scope, EngineConfig::default())
        .transfer(TransferRequest::new(1, 2, 1))
        .await
        .unwrap();

    assert_eq!(ledger.transfer_count(), 1);
    assert_balances_match_entries(&ledger);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_while_waiting_for_lock() {
    let ledger = ledger_with(&[(100, Currency::Usd), (100, Currency::Usd)]);
    let engine = memory_engine(&ledger);

    let mut holder = ledger.begin();
    holder.get_account_for_update(2).await.unwrap();

    let cancel = CancellationToken::new();
    let waiter = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            engine
                .transfer_with_cancellation(TransferRequest::new(1, 2, 10), &cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    cancel.cancel();

    assert_eq!(waiter.await.unwrap().unwrap_err(), LedgerError::Cancelled);
    holder.rollback();

    assert_eq!(ledger.transfer_count(), 0);
    assert_eq!(ledger.get_account(1).unwrap().balance, 100);

    // The cancelled transfer released account 1 again
    engine
        .transfer(TransferRequest::new(1, 2, 10))
        .await
        .unwrap();
    assert_eq!(ledger.get_account(1).unwrap().balance, 90);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_transfer_waiting_for_lock() {
    let ledger = ledger_with(&[(100, Currency::Usd), (100, Currency::Usd)]);
    let engine = TransferEngine::new(
        Arc::clone(&ledger),
        EngineConfig::default().with_timeout(Some(Duration::from_millis(50))),
    );

    let mut holder = ledger.begin();
    holder.get_account_for_update(1).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = engine
        .transfer(TransferRequest::new(2, 1, 10))
        .await
        .unwrap_err();

    assert_eq!(err, LedgerError::TimedOut { millis: 50 });
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    holder.rollback();

    assert_eq!(ledger.transfer_count(), 0);
    let result = engine
        .transfer(TransferRequest::new(2, 1, 10))
        .await
        .unwrap();
    assert_eq!(result.from_account.balance, 90);
}
