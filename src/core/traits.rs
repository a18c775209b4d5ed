//! Core traits for ledger storage and transaction scoping
//!
//! This module defines the two narrow collaborator contracts the transfer
//! engine is written against. Any conforming implementation (the in-memory
//! ledger, the PostgreSQL ledger, a fault-injecting test double) can be
//! swapped in without touching engine logic.

use crate::types::{Account, AccountId, Entry, LedgerError, Transfer};
use async_trait::async_trait;
use futures::future::BoxFuture;

/// Ledger operations scoped to one active transaction
///
/// Every write made through a `LedgerStore` becomes visible only when the
/// owning transaction commits, and disappears if it rolls back.
#[async_trait]
pub trait LedgerStore: Send {
    /// Read an account and take an exclusive row lock on it
    ///
    /// The lock is held until the transaction ends. A concurrent transaction
    /// asking for the same row blocks here until then. Locking a row the
    /// current transaction already holds returns immediately.
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError>;

    /// Overwrite an account balance and return the updated row
    async fn update_account_balance(
        &mut self,
        id: AccountId,
        balance: i64,
    ) -> Result<Account, LedgerError>;

    /// Append a signed entry against an account
    async fn create_entry(&mut self, account_id: AccountId, amount: i64)
        -> Result<Entry, LedgerError>;

    /// Record a transfer between two accounts
    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Transfer, LedgerError>;
}

/// Atomic unit-of-work boundary over a ledger
///
/// `run_in_transaction` hands `work` a transaction-scoped [`LedgerStore`].
/// If `work` resolves to `Ok`, every write it made commits atomically. If it
/// resolves to `Err`, panics, or the returned future is dropped before it
/// completes (cancellation, deadline), nothing it wrote survives.
#[async_trait]
pub trait TransactionScope: Send + Sync {
    /// Run `work` inside a single transaction
    async fn run_in_transaction<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut dyn LedgerStore) -> BoxFuture<'s, Result<T, LedgerError>>
            + Send;
}
