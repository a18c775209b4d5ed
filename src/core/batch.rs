//! Concurrent batch processing of transfer requests
//!
//! This module provides the `TransferBatchProcessor` struct, which runs a batch
//! of transfers as concurrent tokio tasks against one shared engine.
//!
//! # Design
//!
//! Unlike per-client partitioning, no ordering has to be preserved inside a
//! batch: the engine's row locks serialize transfers that share an account and
//! let disjoint transfers run fully in parallel. The only knob is how many
//! transfers may be in flight at once, enforced with a semaphore.
//!
//! # Architecture
//!
//! ```text
//! TransferBatchProcessor
//!     ├── TransferEngine<S>   (shared, cloneable)
//!     └── Arc<Semaphore>      (max transfers in flight)
//! ```

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::error;

use super::engine::TransferEngine;
use super::traits::TransactionScope;
use crate::types::{LedgerError, TransferRequest, TransferResult};

/// Result of processing a single transfer request
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// The request that was processed
    pub request: TransferRequest,

    /// The result of processing (success or error)
    pub result: Result<TransferResult, LedgerError>,
}

impl TransferOutcome {
    /// Whether the transfer committed
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Batch processor with bounded concurrency
#[derive(Debug)]
pub struct TransferBatchProcessor<S> {
    /// Shared transfer engine
    engine: TransferEngine<S>,

    /// Permits for transfers in flight
    permits: Arc<Semaphore>,
}

impl<S> Clone for TransferBatchProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            permits: Arc::clone(&self.permits),
        }
    }
}

impl<S: TransactionScope + 'static> TransferBatchProcessor<S> {
    /// Create a new TransferBatchProcessor
    ///
    /// # Arguments
    ///
    /// * `engine` - Engine every transfer of every batch goes through
    /// * `max_concurrent` - Upper bound on transfers in flight; 0 is treated as 1
    pub fn new(engine: TransferEngine<S>, max_concurrent: usize) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Process a batch of transfer requests concurrently
    ///
    /// This method:
    /// 1. Spawns one tokio task per request
    /// 2. Lets at most `max_concurrent` of them run a transfer at a time
    /// 3. Waits for all tasks to complete
    /// 4. Returns one outcome per request, in input order
    ///
    /// # Guarantees
    ///
    /// - Every request yields exactly one outcome
    /// - A failing transfer never stops the others
    /// - A panicking task is reported as a storage error for its request
    /// - When this method returns, no transfer of the batch is still running
    pub async fn process_batch(&self, batch: Vec<TransferRequest>) -> Vec<TransferOutcome> {
        let mut tasks = Vec::with_capacity(batch.len());
        for request in batch {
            let engine = self.engine.clone();
            let permits = Arc::clone(&self.permits);
            let task = tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| LedgerError::storage("batch processor shut down"))?;
                engine.transfer(request).await
            });
            tasks.push((request, task));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (request, task) in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        from_account_id = request.from_account_id,
                        to_account_id = request.to_account_id,
                        error = %e,
                        "Transfer task panicked"
                    );
                    Err(LedgerError::storage(format!("transfer task failed: {}", e)))
                }
            };
            outcomes.push(TransferOutcome { request, result });
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::LedgerStore;
    use crate::core::{EngineConfig, FundsPolicy, MemoryLedger};
    use crate::types::{Currency, ErrorKind};
    use async_trait::async_trait;
    use futures::future::BoxFuture;

    /// Scope whose transactions always panic
    struct PanickingScope;

    #[async_trait]
    impl TransactionScope for PanickingScope {
        async fn run_in_transaction<T, F>(&self, _work: F) -> Result<T, LedgerError>
        where
            T: Send,
            F: for<'s> FnOnce(&'s mut dyn LedgerStore) -> BoxFuture<'s, Result<T, LedgerError>>
                + Send,
        {
            panic!("scope panic")
        }
    }

    fn processor_with_accounts(
        balances: &[i64],
        max_concurrent: usize,
    ) -> (TransferBatchProcessor<MemoryLedger>, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        for (i, balance) in balances.iter().enumerate() {
            ledger
                .open_account(&format!("owner{}", i), Currency::Usd, *balance)
                .unwrap();
        }
        let engine = TransferEngine::new(
            Arc::clone(&ledger),
            EngineConfig::default().with_funds_policy(FundsPolicy::RequireSufficientFunds),
        );
        (TransferBatchProcessor::new(engine, max_concurrent), ledger)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_process_batch_returns_outcomes_in_input_order() {
        let (processor, _) = processor_with_accounts(&[100, 100, 100], 4);
        let batch = vec![
            TransferRequest::new(1, 2, 10),
            TransferRequest::new(2, 3, 20),
            TransferRequest::new(3, 1, 30),
        ];

        let outcomes = processor.process_batch(batch.clone()).await;

        assert_eq!(outcomes.len(), 3);
        for (outcome, request) in outcomes.iter().zip(&batch) {
            assert_eq!(&outcome.request, request);
            assert!(outcome.is_success());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_process_batch_continues_after_failures() {
        let (processor, ledger) = processor_with_accounts(&[100, 100], 2);
        let batch = vec![
            TransferRequest::new(1, 2, 10),
            TransferRequest::new(1, 99, 10),
            TransferRequest::new(2, 2, 10),
            TransferRequest::new(2, 1, 5),
        ];

        let outcomes = processor.process_batch(batch).await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        assert_eq!(succeeded, 2);
        assert_eq!(ledger.get_account(1).unwrap().balance, 95);
        assert_eq!(ledger.get_account(2).unwrap().balance, 105);
    }

    #[tokio::test]
    async fn test_process_empty_batch() {
        let (processor, _) = processor_with_accounts(&[], 1);
        assert!(processor.process_batch(Vec::new()).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_permit_still_completes_batch() {
        let (processor, ledger) = processor_with_accounts(&[1000, 0], 1);
        let batch = vec![TransferRequest::new(1, 2, 100); 10];

        let outcomes = processor.process_batch(batch).await;

        assert!(outcomes.iter().all(TransferOutcome::is_success));
        assert_eq!(ledger.get_account(1).unwrap().balance, 0);
        assert_eq!(ledger.get_account(2).unwrap().balance, 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_transfer_is_reported_as_failure() {
        let engine = TransferEngine::new(Arc::new(PanickingScope), EngineConfig::default());
        let processor = TransferBatchProcessor::new(engine, 2);
        let batch = vec![TransferRequest::new(1, 2, 10), TransferRequest::new(2, 1, 10)];

        let outcomes = processor.process_batch(batch.clone()).await;

        assert_eq!(outcomes.len(), 2);
        for (outcome, request) in outcomes.iter().zip(&batch) {
            assert_eq!(&outcome.request, request);
            let err = outcome.result.as_ref().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Internal);
            assert!(err.to_string().contains("scope panic"));
        }
    }
}
