//! Error types for the bank transfer engine
//!
//! This module defines every error that can occur while validating, executing
//! or persisting a transfer, plus the I/O errors of the CSV pipeline.
//!
//! # Error Categories
//!
//! - **Validation Errors**: self-transfer, non-positive amount, unsupported currency
//! - **Not-Found Errors**: an account id that does not resolve
//! - **Ledger Errors**: currency mismatch, insufficient funds, balance overflow
//! - **Infrastructure Errors**: store failures, cancellation, deadlines, file I/O
//!
//! Callers map errors onto their own protocol with [`LedgerError::kind`].

use super::account::{AccountId, Currency};
use thiserror::Error;

/// Coarse classification of a [`LedgerError`]
///
/// This is the error surface a caller (an API layer, the CLI) needs to pick a
/// response: a bad request, a missing resource, a business rule violation or an
/// opaque internal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is malformed
    Validation,
    /// A referenced account does not exist
    NotFound,
    /// The two accounts hold different currencies
    CurrencyMismatch,
    /// The source account cannot cover the amount
    InsufficientFunds,
    /// The transfer was cancelled or ran past its deadline
    Cancelled,
    /// Store, I/O or parsing failure
    Internal,
}

/// Main error type for the bank transfer engine
///
/// Every failure aborts the surrounding transaction; none of these errors is
/// ever returned after a partial write became visible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Transfer amount is zero or negative
    #[error("Invalid transfer amount {amount}: amount must be positive")]
    InvalidAmount {
        /// The rejected amount
        amount: i64,
    },

    /// Account identifier is zero or negative
    #[error("Invalid account id {account_id}: ids must be positive")]
    InvalidAccountId {
        /// The rejected id
        account_id: AccountId,
    },

    /// Source and destination are the same account
    #[error("Cannot transfer from account {account_id} to itself")]
    SelfTransfer {
        /// The account named on both sides
        account_id: AccountId,
    },

    /// Currency code outside the supported set
    #[error("Unsupported currency '{currency}'")]
    UnsupportedCurrency {
        /// The rejected currency code
        currency: String,
    },

    /// Account id does not resolve to an account
    #[error("Account {account_id} not found")]
    AccountNotFound {
        /// The missing account id
        account_id: AccountId,
    },

    /// An account with this id already exists
    #[error("Account {account_id} already exists")]
    DuplicateAccount {
        /// The duplicated account id
        account_id: AccountId,
    },

    /// The two accounts of a transfer hold different currencies
    ///
    /// Detected after both row locks are taken and before any write.
    #[error("Currency mismatch: account {from_account_id} holds {from_currency}, account {to_account_id} holds {to_currency}")]
    CurrencyMismatch {
        /// Source account
        from_account_id: AccountId,
        /// Source account currency
        from_currency: Currency,
        /// Destination account
        to_account_id: AccountId,
        /// Destination account currency
        to_currency: Currency,
    },

    /// Source account balance is lower than the transfer amount
    #[error("Insufficient funds in account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Source account
        account_id: AccountId,
        /// Balance observed under the row lock
        balance: i64,
        /// Requested transfer amount
        requested: i64,
    },

    /// Applying the transfer would overflow an account balance
    #[error("Balance overflow on account {account_id}")]
    BalanceOverflow {
        /// Account whose balance would overflow
        account_id: AccountId,
    },

    /// The underlying store failed
    #[error("Storage error: {message}")]
    Storage {
        /// Original store error message
        message: String,
    },

    /// The transfer was cancelled by the caller
    #[error("Transfer cancelled")]
    Cancelled,

    /// The transfer did not finish before its deadline
    #[error("Transfer timed out after {millis} ms")]
    TimedOut {
        /// The deadline that expired, in milliseconds
        millis: u64,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl LedgerError {
    /// Classify the error for the caller
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount { .. }
            | LedgerError::InvalidAccountId { .. }
            | LedgerError::SelfTransfer { .. }
            | LedgerError::UnsupportedCurrency { .. }
            | LedgerError::DuplicateAccount { .. } => ErrorKind::Validation,
            LedgerError::AccountNotFound { .. } => ErrorKind::NotFound,
            LedgerError::CurrencyMismatch { .. } => ErrorKind::CurrencyMismatch,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::Cancelled | LedgerError::TimedOut { .. } => ErrorKind::Cancelled,
            LedgerError::BalanceOverflow { .. }
            | LedgerError::Storage { .. }
            | LedgerError::Io { .. }
            | LedgerError::Parse { .. } => ErrorKind::Internal,
        }
    }
}

// Conversion from io::Error to LedgerError
impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::Io {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to LedgerError
impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

// Conversion from csv_async::Error to LedgerError
impl From<csv_async::Error> for LedgerError {
    fn from(error: csv_async::Error) -> Self {
        // csv-async already folds the position into its message
        LedgerError::Parse {
            line: None,
            message: error.to_string(),
        }
    }
}

// Conversion from sqlx::Error to LedgerError
#[cfg(feature = "postgres")]
impl From<sqlx::Error> for LedgerError {
    fn from(error: sqlx::Error) -> Self {
        LedgerError::Storage {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: i64) -> Self {
        LedgerError::InvalidAmount { amount }
    }

    /// Create an InvalidAccountId error
    pub fn invalid_account_id(account_id: AccountId) -> Self {
        LedgerError::InvalidAccountId { account_id }
    }

    /// Create a SelfTransfer error
    pub fn self_transfer(account_id: AccountId) -> Self {
        LedgerError::SelfTransfer { account_id }
    }

    /// Create an UnsupportedCurrency error
    pub fn unsupported_currency(currency: &str) -> Self {
        LedgerError::UnsupportedCurrency {
            currency: currency.to_string(),
        }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account_id: AccountId) -> Self {
        LedgerError::AccountNotFound { account_id }
    }

    /// Create a DuplicateAccount error
    pub fn duplicate_account(account_id: AccountId) -> Self {
        LedgerError::DuplicateAccount { account_id }
    }

    /// Create a CurrencyMismatch error
    pub fn currency_mismatch(
        from_account_id: AccountId,
        from_currency: Currency,
        to_account_id: AccountId,
        to_currency: Currency,
    ) -> Self {
        LedgerError::CurrencyMismatch {
            from_account_id,
            from_currency,
            to_account_id,
            to_currency,
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account_id: AccountId, balance: i64, requested: i64) -> Self {
        LedgerError::InsufficientFunds {
            account_id,
            balance,
            requested,
        }
    }

    /// Create a BalanceOverflow error
    pub fn balance_overflow(account_id: AccountId) -> Self {
        LedgerError::BalanceOverflow { account_id }
    }

    /// Create a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::Storage {
            message: message.into(),
        }
    }
}
