//! Sequential processing strategy
//!
//! This module provides a single-threaded implementation of the
//! ProcessingStrategy trait. Transfers are applied one at a time, in file order,
//! on a current-thread tokio runtime.
//!
//! # Design
//!
//! The SequentialProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Transfers to `TransferEngine` over a `MemoryLedger`
//! - CSV output to `csv_format::write_accounts_csv`
//!
//! Because exactly one transfer is in flight at any time, the result of a run
//! is fully determined by the order of the transfers file.

use crate::core::{EngineConfig, TransferEngine};
use crate::io::csv_format::{write_accounts_csv, AccountCsvRecord, TransferCsvRecord};
use crate::io::sync_reader::SyncReader;
use crate::strategy::{seed_ledger, ProcessingStrategy, ProcessingSummary};
use crate::types::LedgerError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Sequential processing strategy
///
/// # Examples
///
/// ```no_run
/// use bank_transfer_engine::core::EngineConfig;
/// use bank_transfer_engine::strategy::{ProcessingStrategy, SequentialProcessingStrategy};
/// use std::path::Path;
/// use std::io;
///
/// let strategy = SequentialProcessingStrategy::new(EngineConfig::default());
/// let mut output = io::stdout();
///
/// strategy
///     .process(Path::new("accounts.csv"), Path::new("transfers.csv"), &mut output)
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SequentialProcessingStrategy {
    engine_config: EngineConfig,
}

impl SequentialProcessingStrategy {
    /// Create a new SequentialProcessingStrategy
    pub fn new(engine_config: EngineConfig) -> Self {
        Self { engine_config }
    }
}

impl ProcessingStrategy for SequentialProcessingStrategy {
    /// Apply the transfers file one transfer at a time
    ///
    /// This method:
    /// 1. Seeds a `MemoryLedger` from the accounts file
    /// 2. Streams the transfers file through a SyncReader
    /// 3. Runs each transfer to completion before reading the next
    /// 4. Writes the final account states to output
    fn process(
        &self,
        accounts_path: &Path,
        transfers_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ProcessingSummary, LedgerError> {
        let ledger = Arc::new(seed_ledger(SyncReader::<AccountCsvRecord>::open(
            accounts_path,
        )?)?);
        let transfers = SyncReader::<TransferCsvRecord>::open(transfers_path)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let engine = TransferEngine::new(Arc::clone(&ledger), self.engine_config.clone());
        let mut summary = runtime.block_on(async {
            let mut summary = ProcessingSummary::default();
            for row in transfers {
                match row {
                    Ok(request) => summary.record(&engine.transfer(request).await),
                    Err(error) => warn!(%error, "Skipping transfer row"),
                }
            }
            summary
        });

        let accounts = ledger.list_accounts();
        summary.accounts = accounts.len();
        write_accounts_csv(&accounts, output)?;

        Ok(summary)
    }
}
