//! CSV format handling for account and transfer files
//!
//! This module centralizes all CSV format concerns, providing:
//! - Record structures for deserialization (`AccountCsvRecord`, `TransferCsvRecord`)
//! - The `CsvRow` conversion from CSV records to domain types
//! - Account output serialization
//!
//! Conversions are pure (no I/O) for easy testing.

use crate::types::{Account, AccountId, Currency, LedgerError, TransferRequest};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Write;

/// Header of the account output file
pub const ACCOUNT_HEADER: [&str; 4] = ["id", "owner", "balance", "currency"];

/// A CSV row that converts into a domain value
///
/// Implemented by every record type the readers know how to stream.
pub trait CsvRow: DeserializeOwned {
    /// Domain value the row describes
    type Output;

    /// Convert the deserialized row, rejecting values the CSV layer cannot catch
    fn into_domain(self) -> Result<Self::Output, LedgerError>;
}

/// One row of the accounts file: `id,owner,balance,currency`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountCsvRecord {
    pub id: AccountId,
    pub owner: String,
    pub balance: i64,
    pub currency: String,
}

impl CsvRow for AccountCsvRecord {
    type Output = Account;

    /// Parses the currency code and rejects non-positive ids
    fn into_domain(self) -> Result<Account, LedgerError> {
        if self.id <= 0 {
            return Err(LedgerError::invalid_account_id(self.id));
        }
        let currency: Currency = self.currency.parse()?;

        Ok(Account::new(self.id, self.owner, self.balance, currency))
    }
}

/// One row of the transfers file: `from,to,amount`
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TransferCsvRecord {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: i64,
}

impl CsvRow for TransferCsvRecord {
    type Output = TransferRequest;

    /// Request validation belongs to the engine, so that a rejected transfer
    /// is reported as a failed transfer rather than a skipped row
    fn into_domain(self) -> Result<TransferRequest, LedgerError> {
        Ok(TransferRequest::new(self.from, self.to, self.amount))
    }
}

/// Write account states to CSV format
///
/// Writes accounts with columns `id,owner,balance,currency`, sorted by id for
/// deterministic output. The header is written even when there are no accounts.
///
/// # Arguments
///
/// * `accounts` - Slice of account states to write
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(LedgerError::Io)` if a write error occurred
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(ACCOUNT_HEADER)
        .map_err(|e| write_error("Failed to write CSV header", e))?;

    let mut sorted_accounts: Vec<&Account> = accounts.iter().collect();
    sorted_accounts.sort_by_key(|account| account.id);

    for account in sorted_accounts {
        writer
            .write_record(&[
                account.id.to_string(),
                account.owner.clone(),
                account.balance.to_string(),
                account.currency.code().to_string(),
            ])
            .map_err(|e| write_error("Failed to write account record", e))?;
    }

    writer.flush()?;

    Ok(())
}

fn write_error(context: &str, error: csv::Error) -> LedgerError {
    LedgerError::Io {
        message: format!("{}: {}", context, error),
    }
}
