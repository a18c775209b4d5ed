//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account, account identifier and currency
//! - `entry`: Immutable ledger entries
//! - `transfer`: Transfer records, requests and results
//! - `error`: Error types for the transfer engine

pub mod account;
pub mod entry;
pub mod error;
pub mod transfer;

pub use account::{Account, AccountId, Currency};
pub use entry::{Entry, EntryId};
pub use error::{ErrorKind, LedgerError};
pub use transfer::{Transfer, TransferId, TransferRequest, TransferResult};
