//! Bank Transfer Engine Library
//! # Overview
//!
//! This library moves money between bank accounts with double-entry
//! bookkeeping. Every transfer runs inside one transaction that records the
//! transfer, posts a debit and a credit entry, and updates both balances, so
//! either all of it becomes visible or none of it does.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Entry, Transfer, LedgerError, etc.)
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - The transfer protocol and its lock ordering
//!   - [`core::memory`] - In-memory ledger with row-level locks
//!   - [`core::batch`] - Concurrent batch processing
//! - [`io`] - CSV readers and account output
//! - [`strategy`] - Sequential and concurrent processing pipelines
//! - [`logging`] - Tracing subscriber setup
//!
//! # Concurrency
//!
//! Both accounts of a transfer are locked before anything is read or written,
//! always the smaller account id first. Concurrent transfers over the same
//! accounts therefore serialize without losing updates and without
//! deadlocking, whatever their directions.
//!
//! # Accounts
//!
//! Each account holds:
//! - `owner`: Name of the account holder
//! - `balance`: Amount in the smallest currency unit, equal to the sum of its entries
//! - `currency`: One of USD, EUR, VND; transfers never cross currencies

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod logging;
pub mod strategy;
pub mod types;

pub use core::{
    EngineConfig, FundsPolicy, LedgerStore, MemoryLedger, TransactionScope,
    TransferBatchProcessor, TransferEngine,
};
pub use io::write_accounts_csv;
pub use types::{
    Account, AccountId, Currency, Entry, EntryId, ErrorKind, LedgerError, Transfer, TransferId,
    TransferRequest, TransferResult,
};
