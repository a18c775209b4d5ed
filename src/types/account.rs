//! Account-related types for the bank transfer engine
//!
//! This module defines the Account structure, the account identifier and the
//! closed set of currencies an account can be denominated in.

use super::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account identifier
///
/// Assigned by the ledger store when the account is opened. Always positive.
/// The numeric order of account ids is the lock order used by the engine.
pub type AccountId = i64;

/// Currencies supported by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// United States dollar
    Usd,
    /// Euro
    Eur,
    /// Vietnamese dong
    Vnd,
}

impl Currency {
    /// All supported currencies
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Vnd];

    /// ISO 4217 code of the currency
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Vnd => "VND",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "VND" => Ok(Currency::Vnd),
            _ => Err(LedgerError::unsupported_currency(s)),
        }
    }
}

/// Bank account state
///
/// `balance` is expressed in the smallest unit of `currency` and always equals
/// the sum of every entry ever posted against the account. It is only ever
/// changed through `LedgerStore::update_account_balance` inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable account identifier
    pub id: AccountId,

    /// Owner of the account (a username in the surrounding system)
    pub owner: String,

    /// Current balance in the smallest currency unit; may be negative when
    /// the engine runs with overdrafts allowed
    pub balance: i64,

    /// Currency the account is denominated in
    pub currency: Currency,

    /// When the account was opened
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account snapshot
    pub fn new(id: AccountId, owner: impl Into<String>, balance: i64, currency: Currency) -> Self {
        Account {
            id,
            owner: owner.into(),
            balance,
            currency,
            created_at: Utc::now(),
        }
    }
}
