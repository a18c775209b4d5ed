//! Processing strategy module for batch transfer runs
//!
//! This module defines the Strategy pattern for complete processing pipelines:
//! seeding a ledger from an accounts file, applying a transfers file through the
//! transfer engine, and writing the final account states. This allows different
//! implementations (sequential, concurrent batch) to be selected at runtime.

use crate::cli::StrategyType;
use crate::core::{EngineConfig, MemoryLedger};
use crate::types::{Account, LedgerError};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

pub mod concurrent;
pub mod sequential;

pub use concurrent::{BatchConfig, ConcurrentProcessingStrategy};
pub use sequential::SequentialProcessingStrategy;

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    /// Accounts loaded from the accounts file
    pub accounts: usize,
    /// Transfers that committed
    pub succeeded: usize,
    /// Transfers that were rejected or aborted
    pub failed: usize,
}

impl ProcessingSummary {
    /// Count one transfer outcome
    pub fn record<T>(&mut self, result: &Result<T, LedgerError>) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Processing strategy trait for complete transfer processing pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Apply a transfers file to the accounts of an accounts file
    ///
    /// # Arguments
    ///
    /// * `accounts_path` - CSV file with the opening state of every account
    /// * `transfers_path` - CSV file with the transfers to apply
    /// * `output` - Writer receiving the final account states as CSV
    ///
    /// # Returns
    ///
    /// * `Ok(ProcessingSummary)` if the run completed, even if some transfers failed
    /// * `Err(LedgerError)` if a fatal error occurred
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either input file cannot be opened
    /// - The accounts file lists the same account id twice
    /// - Output cannot be written
    ///
    /// Malformed rows and failed transfers are logged and never abort the run.
    fn process(
        &self,
        accounts_path: &Path,
        transfers_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ProcessingSummary, LedgerError>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create
/// * `engine_config` - Funds policy and per-transfer deadline
/// * `batch_config` - Batch configuration (ignored by the sequential strategy)
pub fn create_strategy(
    strategy_type: StrategyType,
    engine_config: EngineConfig,
    batch_config: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sequential => Box::new(SequentialProcessingStrategy::new(engine_config)),
        StrategyType::Concurrent => Box::new(ConcurrentProcessingStrategy::new(
            engine_config,
            batch_config.unwrap_or_default(),
        )),
    }
}

/// Build a ledger holding `accounts` under their own ids
///
/// A duplicated id is fatal: the run would otherwise depend on which row won.
pub(crate) fn seed_ledger(
    accounts: impl IntoIterator<Item = Result<Account, LedgerError>>,
) -> Result<MemoryLedger, LedgerError> {
    let ledger = MemoryLedger::new();
    let mut loaded = 0usize;

    for account in accounts {
        match account {
            Ok(account) => {
                ledger.open_account_with_id(
                    account.id,
                    &account.owner,
                    account.currency,
                    account.balance,
                )?;
                loaded += 1;
            }
            Err(error) => warn!(%error, "Skipping account row"),
        }
    }

    info!(accounts = loaded, "Ledger seeded");
    Ok(ledger)
}
