//! In-memory ledger store
//!
//! This module provides a thread-safe, fully transactional ledger that keeps
//! all rows in memory:
//!
//! - **MemoryLedger**: committed accounts, entries and transfers plus per-account
//!   row locks; implements `TransactionScope`
//! - **MemoryTransaction**: one unit of work with staged writes; implements
//!   `LedgerStore`
//!
//! # Locking
//!
//! Each account row has its own lock. Operations on different accounts
//! proceed in parallel, operations on the same account are serialized for the
//! whole lifetime of the transaction that locked it.

pub mod ledger;
pub mod transaction;

pub use ledger::MemoryLedger;
pub use transaction::MemoryTransaction;
