//! Transactions over the in-memory ledger
//!
//! A `MemoryTransaction` stages every write it receives and holds the row lock
//! of every account it touched. `commit` publishes the staged rows and then
//! releases the locks; `rollback` (or simply dropping the transaction) throws
//! the staged rows away and releases the locks.

use super::ledger::MemoryLedger;
use crate::core::traits::LedgerStore;
use crate::types::{Account, AccountId, Entry, LedgerError, Transfer};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, trace};

/// An account row locked by the transaction
#[derive(Debug)]
struct LockedRow {
    guard: OwnedMutexGuard<()>,
    account: Account,
    dirty: bool,
}

/// One unit of work against a [`MemoryLedger`]
#[derive(Debug)]
pub struct MemoryTransaction<'l> {
    ledger: &'l MemoryLedger,
    rows: HashMap<AccountId, LockedRow>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
}

impl<'l> MemoryTransaction<'l> {
    pub(crate) fn new(ledger: &'l MemoryLedger) -> Self {
        Self {
            ledger,
            rows: HashMap::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
        }
    }

    /// Publish all staged writes, then release the row locks
    pub fn commit(self) {
        let MemoryTransaction {
            ledger,
            rows,
            entries,
            transfers,
        } = self;

        let mut guards = Vec::with_capacity(rows.len());
        let mut updated = Vec::new();
        for (_, row) in rows {
            if row.dirty {
                updated.push(row.account);
            }
            guards.push(row.guard);
        }

        debug!(
            accounts = updated.len(),
            entries = entries.len(),
            transfers = transfers.len(),
            "Committing transaction"
        );
        ledger.publish(updated, entries, transfers);

        // Locks go only after the rows are visible
        drop(guards);
    }

    /// Discard all staged writes and release the row locks
    pub fn rollback(self) {
        debug!(
            locked_rows = self.rows.len(),
            entries = self.entries.len(),
            transfers = self.transfers.len(),
            "Rolling back transaction"
        );
    }

    /// Number of account rows currently locked by this transaction
    pub fn locked_rows(&self) -> usize {
        self.rows.len()
    }

    /// Take the row lock of `id` unless this transaction already holds it
    async fn lock_row(&mut self, id: AccountId) -> Result<&mut LockedRow, LedgerError> {
        if !self.rows.contains_key(&id) {
            if self.ledger.get_account(id).is_none() {
                return Err(LedgerError::account_not_found(id));
            }

            trace!(account_id = id, "Waiting for row lock");
            let guard = self.ledger.row_lock(id).lock_owned().await;

            // Read again under the lock: the previous holder may have committed
            let account = self
                .ledger
                .get_account(id)
                .ok_or_else(|| LedgerError::account_not_found(id))?;
            trace!(account_id = id, balance = account.balance, "Row lock acquired");

            self.rows.insert(
                id,
                LockedRow {
                    guard,
                    account,
                    dirty: false,
                },
            );
        }

        self.rows
            .get_mut(&id)
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    fn ensure_account_exists(&self, id: AccountId) -> Result<(), LedgerError> {
        if self.rows.contains_key(&id) || self.ledger.get_account(id).is_some() {
            Ok(())
        } else {
            Err(LedgerError::account_not_found(id))
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryTransaction<'_> {
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        let row = self.lock_row(id).await?;
        Ok(row.account.clone())
    }

    async fn update_account_balance(
        &mut self,
        id: AccountId,
        balance: i64,
    ) -> Result<Account, LedgerError> {
        let row = self.lock_row(id).await?;
        row.account.balance = balance;
        row.dirty = true;
        Ok(row.account.clone())
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: i64,
    ) -> Result<Entry, LedgerError> {
        self.ensure_account_exists(account_id)?;

        let entry = Entry {
            id: self.ledger.next_entry_id(),
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        self.ensure_account_exists(from_account_id)?;
        self.ensure_account_exists(to_account_id)?;

        let transfer = Transfer {
            id: self.ledger.next_transfer_id(),
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }
}
