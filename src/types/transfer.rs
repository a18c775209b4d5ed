//! Transfer-related types for the bank transfer engine
//!
//! This module defines the persisted transfer record, the request a caller
//! submits to the engine and the composite result the engine hands back.

use super::account::{Account, AccountId};
use super::entry::Entry;
use super::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transfer identifier
pub type TransferId = i64;

/// Immutable record of one money movement between two accounts
///
/// `amount` is always positive; the direction is carried by the two account
/// fields. Every transfer is paired with exactly two entries created in the
/// same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Transfer identifier assigned by the store
    pub id: TransferId,

    /// Account the money leaves
    pub from_account_id: AccountId,

    /// Account the money arrives at
    pub to_account_id: AccountId,

    /// Amount moved, in the smallest currency unit
    pub amount: i64,

    /// When the transfer was recorded
    pub created_at: DateTime<Utc>,
}

/// A request to move `amount` from one account to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Account to debit
    pub from_account_id: AccountId,

    /// Account to credit
    pub to_account_id: AccountId,

    /// Amount in the smallest currency unit; must be positive
    pub amount: i64,
}

impl TransferRequest {
    /// Create a new transfer request
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: i64) -> Self {
        TransferRequest {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Check the request-level preconditions
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the request can be handed to the engine
    /// * `Err(LedgerError::InvalidAccountId)` - If either id is not positive
    /// * `Err(LedgerError::SelfTransfer)` - If both ids name the same account
    /// * `Err(LedgerError::InvalidAmount)` - If the amount is zero or negative
    pub fn validate(&self) -> Result<(), LedgerError> {
        for account_id in [self.from_account_id, self.to_account_id] {
            if account_id <= 0 {
                return Err(LedgerError::invalid_account_id(account_id));
            }
        }

        if self.from_account_id == self.to_account_id {
            return Err(LedgerError::self_transfer(self.from_account_id));
        }

        if self.amount <= 0 {
            return Err(LedgerError::invalid_amount(self.amount));
        }

        Ok(())
    }
}

/// Everything a successful transfer produced
///
/// Not persisted. The account snapshots are the rows returned by the balance
/// updates of this transfer, not a fresh read after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    /// The created transfer record
    pub transfer: Transfer,

    /// Source account after the debit
    pub from_account: Account,

    /// Destination account after the credit
    pub to_account: Account,

    /// Debit entry posted against the source account
    pub from_entry: Entry,

    /// Credit entry posted against the destination account
    pub to_entry: Entry,
}
