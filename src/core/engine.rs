//! Transfer orchestration
//!
//! This module provides the `TransferEngine` struct, which moves money between
//! two accounts inside a single transaction of a [`TransactionScope`].
//!
//! # Protocol
//!
//! Every transfer runs these steps in one transaction:
//!
//! 1. Lock both accounts with `get_account_for_update`, smaller id first
//! 2. Reject mismatched currencies
//! 3. Apply the funds policy to the source balance
//! 4. Create the transfer record
//! 5. Create the debit entry, then the credit entry
//! 6. Write both new balances, smaller id first
//! 7. Return the transfer, both entries and both updated accounts
//!
//! Any error aborts the transaction, so either all five writes (one transfer,
//! two entries, two balances) become visible or none does.
//!
//! # Deadlock Freedom
//!
//! The lock order depends only on the account ids, never on the transfer
//! direction. Two transfers A→B and B→A both lock `min(A, B)` first, so no
//! cycle of waiting transactions can form, whatever the number of concurrent
//! transfers over overlapping accounts.
//!
//! # Thread Safety
//!
//! The engine holds no state between calls. It is cheap to clone and safe to
//! share across tokio tasks; all mutual exclusion happens in the store's row
//! locks.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{EngineConfig, FundsPolicy};
use super::traits::{LedgerStore, TransactionScope};
use crate::types::{Account, AccountId, LedgerError, TransferRequest, TransferResult};

/// Money transfer orchestrator
///
/// Generic over the transaction scope so that the same logic runs against the
/// in-memory ledger, PostgreSQL, or a test double.
#[derive(Debug)]
pub struct TransferEngine<S> {
    /// Ledger the engine opens its transactions on
    scope: Arc<S>,

    /// Funds policy and deadline
    config: EngineConfig,
}

impl<S> Clone for TransferEngine<S> {
    fn clone(&self) -> Self {
        Self {
            scope: Arc::clone(&self.scope),
            config: self.config.clone(),
        }
    }
}

impl<S: TransactionScope> TransferEngine<S> {
    /// Create a new TransferEngine
    ///
    /// # Arguments
    ///
    /// * `scope` - Arc-wrapped transaction scope every transfer runs in
    /// * `config` - Funds policy and per-transfer deadline
    pub fn new(scope: Arc<S>, config: EngineConfig) -> Self {
        Self { scope, config }
    }

    /// The transaction scope this engine runs on
    pub fn scope(&self) -> &Arc<S> {
        &self.scope
    }

    /// Transfer `request.amount` from one account to another
    ///
    /// # Returns
    ///
    /// * `Ok(TransferResult)` - The committed transfer, its entries and both accounts
    /// * `Err(LedgerError::SelfTransfer | InvalidAmount | InvalidAccountId)` - Rejected request
    /// * `Err(LedgerError::AccountNotFound)` - Either account does not exist
    /// * `Err(LedgerError::CurrencyMismatch)` - The accounts hold different currencies
    /// * `Err(LedgerError::InsufficientFunds)` - The funds policy rejected the transfer
    /// * `Err(LedgerError::TimedOut)` - The configured deadline expired
    /// * `Err(LedgerError::Storage)` - The store failed; the original message is kept
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferResult, LedgerError> {
        request.validate()?;

        let funds_policy = self.config.funds_policy;
        let work = self.scope.run_in_transaction(move |store| {
            Box::pin(execute_transfer(store, request, funds_policy))
        });

        // Dropping `work` on expiry rolls the transaction back
        let outcome = match self.config.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, work).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LedgerError::TimedOut {
                    millis: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                }),
            },
            None => work.await,
        };

        match &outcome {
            Ok(result) => info!(
                transfer_id = result.transfer.id,
                from_account_id = request.from_account_id,
                to_account_id = request.to_account_id,
                amount = request.amount,
                "Transfer committed"
            ),
            Err(error) => warn!(
                from_account_id = request.from_account_id,
                to_account_id = request.to_account_id,
                amount = request.amount,
                %error,
                "Transfer aborted"
            ),
        }

        outcome
    }

    /// Transfer, giving up as soon as `cancel` fires
    ///
    /// A cancelled transfer is rolled back exactly like a failed one and
    /// returns `LedgerError::Cancelled`.
    pub async fn transfer_with_cancellation(
        &self,
        request: TransferRequest,
        cancel: &CancellationToken,
    ) -> Result<TransferResult, LedgerError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(
                    from_account_id = request.from_account_id,
                    to_account_id = request.to_account_id,
                    "Transfer cancelled"
                );
                Err(LedgerError::Cancelled)
            }
            outcome = self.transfer(request) => outcome,
        }
    }
}

/// The transfer protocol, run against a transaction-scoped store
async fn execute_transfer(
    store: &mut dyn LedgerStore,
    request: TransferRequest,
    funds_policy: FundsPolicy,
) -> Result<TransferResult, LedgerError> {
    let TransferRequest {
        from_account_id,
        to_account_id,
        amount,
    } = request;

    let (from_account, to_account) = lock_accounts(store, from_account_id, to_account_id).await?;

    if from_account.currency != to_account.currency {
        return Err(LedgerError::currency_mismatch(
            from_account_id,
            from_account.currency,
            to_account_id,
            to_account.currency,
        ));
    }

    if funds_policy == FundsPolicy::RequireSufficientFunds && from_account.balance < amount {
        return Err(LedgerError::insufficient_funds(
            from_account_id,
            from_account.balance,
            amount,
        ));
    }

    let from_balance = from_account
        .balance
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::balance_overflow(from_account_id))?;
    let to_balance = to_account
        .balance
        .checked_add(amount)
        .ok_or_else(|| LedgerError::balance_overflow(to_account_id))?;

    let transfer = store
        .create_transfer(from_account_id, to_account_id, amount)
        .await?;
    let from_entry = store.create_entry(from_account_id, -amount).await?;
    let to_entry = store.create_entry(to_account_id, amount).await?;

    // Same order as the locks were taken
    let (from_account, to_account) = if from_account_id < to_account_id {
        let from_account = store
            .update_account_balance(from_account_id, from_balance)
            .await?;
        let to_account = store
            .update_account_balance(to_account_id, to_balance)
            .await?;
        (from_account, to_account)
    } else {
        let to_account = store
            .update_account_balance(to_account_id, to_balance)
            .await?;
        let from_account = store
            .update_account_balance(from_account_id, from_balance)
            .await?;
        (from_account, to_account)
    };

    Ok(TransferResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Lock both accounts, smaller id first, and return them as (from, to)
async fn lock_accounts(
    store: &mut dyn LedgerStore,
    from_account_id: AccountId,
    to_account_id: AccountId,
) -> Result<(Account, Account), LedgerError> {
    let (first, second) = lock_order(from_account_id, to_account_id);

    let first_account = store.get_account_for_update(first).await?;
    let second_account = store.get_account_for_update(second).await?;
    debug!(first, second, "Locked transfer accounts");

    if first == from_account_id {
        Ok((first_account, second_account))
    } else {
        Ok((second_account, first_account))
    }
}

/// Order in which the two accounts of a transfer are locked
///
/// A total order on account ids that ignores the transfer direction.
pub fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
