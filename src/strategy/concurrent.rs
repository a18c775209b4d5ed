//! Concurrent batch processing strategy
//!
//! This module provides a multi-threaded implementation of the
//! ProcessingStrategy trait. Transfers are read in batches and every batch is
//! run through a `TransferBatchProcessor` on a multi-threaded tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! ConcurrentProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent)
//!     ├── AsyncReader (batch CSV reading)
//!     └── TransferBatchProcessor (bounded tokio tasks)
//!         └── TransferEngine<MemoryLedger> (row-locked transactions)
//! ```
//!
//! # Ordering
//!
//! Batches run one after another, so a transfer never starts before every
//! transfer of the previous batch finished. Inside a batch there is no
//! ordering: when transfers compete for the same funds, which of them wins is
//! decided by lock acquisition order. Balances are still conserved and no
//! update is ever lost.

use crate::core::{EngineConfig, TransferBatchProcessor, TransferEngine};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::{write_accounts_csv, AccountCsvRecord, TransferCsvRecord};
use crate::strategy::{seed_ledger, ProcessingStrategy, ProcessingSummary};
use crate::types::LedgerError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, warn};

/// Configuration for batch processing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of transfers per batch
    pub batch_size: usize,
    /// Maximum number of transfers in flight
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig with custom values
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = default.batch_size,
                "Invalid batch_size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent = if max_concurrent == 0 {
            warn!(
                max_concurrent,
                default = default.max_concurrent,
                "Invalid max_concurrent, using default"
            );
            default.max_concurrent
        } else {
            max_concurrent
        };

        Self {
            batch_size,
            max_concurrent,
        }
    }
}

/// Concurrent batch processing strategy
///
/// # Configuration
///
/// - `batch_size`: Number of transfers per batch (default: 1000)
/// - `max_concurrent`: Transfers in flight and runtime worker threads (default: CPU cores)
#[derive(Debug, Clone, Default)]
pub struct ConcurrentProcessingStrategy {
    engine_config: EngineConfig,
    batch_config: BatchConfig,
}

impl ConcurrentProcessingStrategy {
    /// Create a new ConcurrentProcessingStrategy
    pub fn new(engine_config: EngineConfig, batch_config: BatchConfig) -> Self {
        Self {
            engine_config,
            batch_config,
        }
    }
}

impl ProcessingStrategy for ConcurrentProcessingStrategy {
    /// Apply the transfers file batch by batch
    ///
    /// This method:
    /// 1. Creates a tokio multi-threaded runtime
    /// 2. Seeds a `MemoryLedger` from the accounts file
    /// 3. Reads transfers in batches using AsyncReader
    /// 4. Runs each batch concurrently and waits for it before reading the next
    /// 5. Writes the final account states to output
    fn process(
        &self,
        accounts_path: &Path,
        transfers_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ProcessingSummary, LedgerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.batch_config.max_concurrent)
            .enable_time()
            .build()?;

        let (ledger, mut summary) = runtime.block_on(async {
            let mut accounts: AsyncReader<_, AccountCsvRecord> =
                AsyncReader::new(open_compat(accounts_path).await?);
            let mut transfers: AsyncReader<_, TransferCsvRecord> =
                AsyncReader::new(open_compat(transfers_path).await?);

            let ledger = Arc::new(seed_ledger(accounts.read_all().await.into_iter().map(Ok))?);
            let engine = TransferEngine::new(Arc::clone(&ledger), self.engine_config.clone());
            let processor = TransferBatchProcessor::new(engine, self.batch_config.max_concurrent);

            let mut summary = ProcessingSummary::default();
            loop {
                let batch = transfers.read_batch(self.batch_config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                debug!(size = batch.len(), "Processing batch");
                for outcome in processor.process_batch(batch).await {
                    summary.record(&outcome.result);
                }
            }

            Ok::<_, LedgerError>((ledger, summary))
        })?;

        let accounts = ledger.list_accounts();
        summary.accounts = accounts.len();
        write_accounts_csv(&accounts, output)?;

        Ok(summary)
    }
}

async fn open_compat(path: &Path) -> Result<Compat<tokio::fs::File>, LedgerError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LedgerError::Io {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        })?;

    Ok(file.compat())
}
