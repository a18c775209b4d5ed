//! Ledger entry types
//!
//! An entry is one signed line of the double-entry bookkeeping: every transfer
//! posts exactly one debit and one credit entry. Entries are append-only.

use super::account::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entry identifier
pub type EntryId = i64;

/// Immutable ledger line against a single account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Entry identifier assigned by the store
    pub id: EntryId,

    /// Account the entry is posted against
    pub account_id: AccountId,

    /// Signed amount: negative for a debit, positive for a credit
    pub amount: i64,

    /// When the entry was created
    pub created_at: DateTime<Utc>,
}
