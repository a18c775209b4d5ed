//! Thread-safe in-memory ledger
//!
//! This module provides the `MemoryLedger` struct, a complete ledger store that
//! keeps accounts, entries and transfers in memory and hands out transactions
//! with real row-level locking.
//!
//! # Design
//!
//! ```text
//! MemoryLedger
//!     ├── RwLock<Tables>                        (committed rows)
//!     ├── DashMap<AccountId, Arc<Mutex<()>>>    (one row lock per account)
//!     └── AtomicI64 sequences                   (account / entry / transfer ids)
//! ```
//!
//! Committed rows live behind a single `RwLock` so that a commit publishes all
//! of a transaction's rows at once: readers either see every row of a transfer
//! or none of them. Row locks are tokio mutexes looked up through a `DashMap`;
//! a transaction keeps the owned guard of every row it locked until it commits
//! or rolls back, which is what serializes concurrent transfers on the same
//! account.
//!
//! # Thread Safety
//!
//! `MemoryLedger` is `Send + Sync` and is meant to be shared behind an `Arc`.
//! The `RwLock` is only ever held for short, non-async critical sections; it is
//! never held while waiting for a row lock.

use super::transaction::MemoryTransaction;
use crate::core::traits::{LedgerStore, TransactionScope};
use crate::types::{
    Account, AccountId, Currency, Entry, EntryId, LedgerError, Transfer, TransferId,
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::debug;

/// Committed ledger rows
#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
}

/// In-memory ledger store with transactional, row-locked access
///
/// Implements [`TransactionScope`]; the transactions it runs implement
/// [`LedgerStore`]. Outside a transaction it offers read-only access to the
/// committed state plus account opening.
#[derive(Debug)]
pub struct MemoryLedger {
    tables: RwLock<Tables>,
    row_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            row_locks: DashMap::new(),
            account_seq: AtomicI64::new(0),
            entry_seq: AtomicI64::new(0),
            transfer_seq: AtomicI64::new(0),
        }
    }

    /// Open a new account with the next free id
    ///
    /// A non-zero `opening_balance` is posted as an opening entry so that the
    /// balance always equals the sum of the account's entries.
    pub fn open_account(
        &self,
        owner: &str,
        currency: Currency,
        opening_balance: i64,
    ) -> Result<Account, LedgerError> {
        let id = self.account_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.insert_account(id, owner, currency, opening_balance)
    }

    /// Open an account under a caller-chosen id
    ///
    /// Used when seeding the ledger from an external account list.
    ///
    /// # Returns
    ///
    /// * `Ok(Account)` - The opened account
    /// * `Err(LedgerError::InvalidAccountId)` - If `id` is not positive
    /// * `Err(LedgerError::DuplicateAccount)` - If the id is already taken
    pub fn open_account_with_id(
        &self,
        id: AccountId,
        owner: &str,
        currency: Currency,
        opening_balance: i64,
    ) -> Result<Account, LedgerError> {
        if id <= 0 {
            return Err(LedgerError::invalid_account_id(id));
        }
        let account = self.insert_account(id, owner, currency, opening_balance)?;
        // Keep generated ids clear of explicitly chosen ones
        self.account_seq.fetch_max(id, Ordering::SeqCst);
        Ok(account)
    }

    fn insert_account(
        &self,
        id: AccountId,
        owner: &str,
        currency: Currency,
        opening_balance: i64,
    ) -> Result<Account, LedgerError> {
        let mut tables = self.write_tables();
        if tables.accounts.contains_key(&id) {
            return Err(LedgerError::duplicate_account(id));
        }

        let account = Account::new(id, owner, opening_balance, currency);
        if opening_balance != 0 {
            let entry = Entry {
                id: self.next_entry_id(),
                account_id: id,
                amount: opening_balance,
                created_at: account.created_at,
            };
            tables.entries.insert(entry.id, entry);
        }
        tables.accounts.insert(id, account.clone());

        debug!(account_id = id, owner, %currency, opening_balance, "Opened account");
        Ok(account)
    }

    /// Committed state of an account
    pub fn get_account(&self, id: AccountId) -> Option<Account> {
        self.read_tables().accounts.get(&id).cloned()
    }

    /// All committed accounts, ordered by id
    pub fn list_accounts(&self) -> Vec<Account> {
        self.read_tables().accounts.values().cloned().collect()
    }

    /// A committed entry by id
    pub fn get_entry(&self, id: EntryId) -> Option<Entry> {
        self.read_tables().entries.get(&id).cloned()
    }

    /// All committed entries of an account, oldest first
    pub fn list_entries(&self, account_id: AccountId) -> Vec<Entry> {
        self.read_tables()
            .entries
            .values()
            .filter(|entry| entry.account_id == account_id)
            .cloned()
            .collect()
    }

    /// A committed transfer by id
    pub fn get_transfer(&self, id: TransferId) -> Option<Transfer> {
        self.read_tables().transfers.get(&id).cloned()
    }

    /// All committed transfers from one account to another, oldest first
    pub fn list_transfers_between(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
    ) -> Vec<Transfer> {
        self.read_tables()
            .transfers
            .values()
            .filter(|t| t.from_account_id == from_account_id && t.to_account_id == to_account_id)
            .cloned()
            .collect()
    }

    /// Number of committed entries, opening entries included
    pub fn entry_count(&self) -> usize {
        self.read_tables().entries.len()
    }

    /// Number of committed transfers
    pub fn transfer_count(&self) -> usize {
        self.read_tables().transfers.len()
    }

    /// Start a transaction against this ledger
    ///
    /// Prefer [`TransactionScope::run_in_transaction`], which commits and rolls
    /// back for you. A transaction dropped without `commit` rolls back.
    pub fn begin(&self) -> MemoryTransaction<'_> {
        MemoryTransaction::new(self)
    }

    /// Row lock of an account, created on first use
    pub(crate) fn row_lock(&self, id: AccountId) -> Arc<Mutex<()>> {
        self.row_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn next_entry_id(&self) -> EntryId {
        self.entry_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn next_transfer_id(&self) -> TransferId {
        self.transfer_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make a transaction's staged rows visible in one step
    pub(crate) fn publish(
        &self,
        accounts: impl IntoIterator<Item = Account>,
        entries: Vec<Entry>,
        transfers: Vec<Transfer>,
    ) {
        let mut tables = self.write_tables();
        for account in accounts {
            tables.accounts.insert(account.id, account);
        }
        for entry in entries {
            tables.entries.insert(entry.id, entry);
        }
        for transfer in transfers {
            tables.transfers.insert(transfer.id, transfer);
        }
    }

    // Tables are only mutated by single inserts, so a poisoned lock still
    // guards consistent rows.
    fn read_tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionScope for MemoryLedger {
    async fn run_in_transaction<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut dyn LedgerStore) -> BoxFuture<'s, Result<T, LedgerError>>
            + Send,
    {
        let mut tx = self.begin();
        let outcome = work(&mut tx).await;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_account_assigns_sequential_ids() {
        let ledger = MemoryLedger::new();

        let first = ledger.open_account("alice", Currency::Usd, 0).unwrap();
        let second = ledger.open_account("bob", Currency::Usd, 0).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(ledger.list_accounts().len(), 2);
    }

    #[test]
    fn test_opening_balance_is_posted_as_entry() {
        let ledger = MemoryLedger::new();

        let account = ledger.open_account("alice", Currency::Eur, 1000).unwrap();
        let entries = ledger.list_entries(account.id);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, 1000);
        assert_eq!(account.balance, 1000);
    }

    #[test]
    fn test_zero_opening_balance_posts_no_entry() {
        let ledger = MemoryLedger::new();

        let account = ledger.open_account("alice", Currency::Eur, 0).unwrap();

        assert!(ledger.list_entries(account.id).is_empty());
        assert_eq!(ledger.entry_count(), 0);
    }

    #[test]
    fn test_open_account_with_id_rejects_duplicates() {
        let ledger = MemoryLedger::new();
        ledger
            .open_account_with_id(10, "alice", Currency::Usd, 5)
            .unwrap();

        let result = ledger.open_account_with_id(10, "bob", Currency::Usd, 5);

        assert_eq!(result, Err(LedgerError::duplicate_account(10)));
        assert_eq!(ledger.get_account(10).unwrap().owner, "alice");
    }

    #[test]
    fn test_open_account_with_id_rejects_non_positive_ids() {
        let ledger = MemoryLedger::new();

        let result = ledger.open_account_with_id(0, "alice", Currency::Usd, 5);

        assert_eq!(result, Err(LedgerError::invalid_account_id(0)));
    }

    #[test]
    fn test_generated_ids_skip_seeded_ids() {
        let ledger = MemoryLedger::new();
        ledger
            .open_account_with_id(5, "alice", Currency::Usd, 0)
            .unwrap();

        let generated = ledger.open_account("bob", Currency::Usd, 0).unwrap();

        assert_eq!(generated.id, 6);
    }

    #[test]
    fn test_get_account_unknown_id() {
        let ledger = MemoryLedger::new();
        assert!(ledger.get_account(99).is_none());
    }

    #[test]
    fn test_row_lock_is_shared_per_account() {
        let ledger = MemoryLedger::new();

        let first = ledger.row_lock(1);
        let second = ledger.row_lock(1);
        let other = ledger.row_lock(2);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn test_run_in_transaction_commits_on_ok() {
        let ledger = MemoryLedger::new();
        let account = ledger.open_account("alice", Currency::Usd, 100).unwrap();
        let id = account.id;

        let updated = ledger
            .run_in_transaction(move |store| {
                Box::pin(async move {
                    store.get_account_for_update(id).await?;
                    store.create_entry(id, -30).await?;
                    store.update_account_balance(id, 70).await
                })
            })
            .await
            .unwrap();

        assert_eq!(updated.balance, 70);
        assert_eq!(ledger.get_account(id).unwrap().balance, 70);
        assert_eq!(ledger.list_entries(id).len(), 2);
    }

    #[tokio::test]
    async fn test_run_in_transaction_rolls_back_on_err() {
        let ledger = MemoryLedger::new();
        let account = ledger.open_account("alice", Currency::Usd, 100).unwrap();
        let id = account.id;

        let result: Result<(), LedgerError> = ledger
            .run_in_transaction(move |store| {
                Box::pin(async move {
                    store.get_account_for_update(id).await?;
                    store.create_entry(id, -30).await?;
                    store.update_account_balance(id, 70).await?;
                    Err(LedgerError::storage("injected"))
                })
            })
            .await;

        assert_eq!(result, Err(LedgerError::storage("injected")));
        assert_eq!(ledger.get_account(id).unwrap().balance, 100);
        assert_eq!(ledger.list_entries(id).len(), 1);
    }

    #[tokio::test]
    async fn test_run_in_transaction_rolls_back_when_work_panics() {
        let ledger = Arc::new(MemoryLedger::new());
        let id = ledger.open_account("alice", Currency::Usd, 100).unwrap().id;

        let task = tokio::spawn({
            let ledger = Arc::clone(&ledger);
            async move {
                ledger
                    .run_in_transaction(move |store| {
                        Box::pin(async move {
                            store.get_account_for_update(id).await?;
                            store.create_entry(id, -5).await?;
                            let updated = store.update_account_balance(id, 95).await?;
                            if updated.balance == 95 {
                                panic!("work failed after writing");
                            }
                            Ok(updated)
                        })
                    })
                    .await
            }
        });

        assert!(task.await.unwrap_err().is_panic());
        assert_eq!(ledger.get_account(id).unwrap().balance, 100);
        assert_eq!(ledger.list_entries(id).len(), 1);
        assert!(ledger.row_lock(id).try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_releases_row_locks() {
        let ledger = MemoryLedger::new();
        let id = ledger.open_account("alice", Currency::Usd, 0).unwrap().id;

        let _: Result<(), LedgerError> = ledger
            .run_in_transaction(move |store| {
                Box::pin(async move {
                    store.get_account_for_update(id).await?;
                    Err(LedgerError::storage("injected"))
                })
            })
            .await;

        assert!(ledger.row_lock(id).try_lock().is_ok());
    }
}
