//! Core business logic module
//!
//! This module contains the transfer processing components:
//! - `traits` - The ledger store and transaction scope abstractions
//! - `config` - Funds policy and per-transfer deadline
//! - `engine` - The transfer protocol
//! - `batch` - Bounded-concurrency batch processing
//! - `memory` - In-process ledger with row-level locking
//! - `postgres` - PostgreSQL ledger (feature-gated)

pub mod batch;
pub mod config;
pub mod engine;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use batch::{TransferBatchProcessor, TransferOutcome};
pub use config::{EngineConfig, FundsPolicy};
pub use engine::{lock_order, TransferEngine};
pub use memory::{MemoryLedger, MemoryTransaction};
#[cfg(feature = "postgres")]
pub use postgres::PgLedger;
pub use traits::{LedgerStore, TransactionScope};
