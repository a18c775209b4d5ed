//! PostgreSQL-backed ledger
//!
//! Enabled with the `postgres` cargo feature. `PgLedger` runs every transfer in
//! a database transaction and relies on `SELECT ... FOR NO KEY UPDATE` for the
//! row locks, so several engine processes can share one database.
//!
//! `FOR NO KEY UPDATE` is enough because transfers never change an account's
//! key, and unlike `FOR UPDATE` it does not conflict with the key-share locks
//! that inserting `entries`/`transfers` rows takes on the referenced accounts.

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, warn};

use super::traits::{LedgerStore, TransactionScope};
use crate::types::{Account, AccountId, Currency, Entry, LedgerError, Transfer};

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id bigserial PRIMARY KEY,
        owner varchar NOT NULL,
        balance bigint NOT NULL,
        currency varchar NOT NULL,
        created_at timestamptz NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS entries (
        id bigserial PRIMARY KEY,
        account_id bigint NOT NULL REFERENCES accounts (id),
        amount bigint NOT NULL,
        created_at timestamptz NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transfers (
        id bigserial PRIMARY KEY,
        from_account_id bigint NOT NULL
            CONSTRAINT transfers_from_account_id_fkey REFERENCES accounts (id),
        to_account_id bigint NOT NULL
            CONSTRAINT transfers_to_account_id_fkey REFERENCES accounts (id),
        amount bigint NOT NULL CHECK (amount > 0),
        created_at timestamptz NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS entries_account_id_idx ON entries (account_id)",
    "CREATE INDEX IF NOT EXISTS transfers_from_account_id_idx ON transfers (from_account_id)",
    "CREATE INDEX IF NOT EXISTS transfers_to_account_id_idx ON transfers (to_account_id)",
];

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";

const TRANSFER_TO_ACCOUNT_FKEY: &str = "transfers_to_account_id_fkey";

/// Ledger stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Wrap an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a pool of at most `max_connections`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the ledger tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Ledger schema ready");
        Ok(())
    }

    /// Open an account, posting a non-zero opening balance as an entry
    pub async fn open_account(
        &self,
        owner: &str,
        currency: Currency,
        opening_balance: i64,
    ) -> Result<Account, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, $2, $3) RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(owner)
        .bind(opening_balance)
        .bind(currency.code())
        .fetch_one(&mut *tx)
        .await?;
        let account = account_from_row(&row)?;

        if opening_balance != 0 {
            sqlx::query("INSERT INTO entries (account_id, amount) VALUES ($1, $2)")
                .bind(account.id)
                .bind(opening_balance)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(account)
    }

    /// Committed state of an account
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    /// All accounts, ordered by id
    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts ORDER BY id",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    /// Committed entries of an account, ordered by id
    pub async fn list_entries(&self, account_id: AccountId) -> Result<Vec<Entry>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM entries WHERE account_id = $1 ORDER BY id",
            ENTRY_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Committed transfers from one account to another, ordered by id
    pub async fn list_transfers_between(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transfers WHERE from_account_id = $1 AND to_account_id = $2 ORDER BY id",
            TRANSFER_COLUMNS
        ))
        .bind(from_account_id)
        .bind(to_account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transfer_from_row).collect()
    }
}

#[async_trait]
impl TransactionScope for PgLedger {
    async fn run_in_transaction<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut dyn LedgerStore) -> BoxFuture<'s, Result<T, LedgerError>>
            + Send,
    {
        let mut tx = self.pool.begin().await?;

        let outcome = {
            let mut store = PgTransactionStore { conn: &mut *tx };
            work(&mut store).await
        };

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(%error, %rollback_error, "Rollback failed");
                }
                Err(error)
            }
        }
    }
}

/// Ledger operations on the connection of an open transaction
struct PgTransactionStore<'c> {
    conn: &'c mut PgConnection,
}

#[async_trait]
impl LedgerStore for PgTransactionStore<'_> {
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR NO KEY UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(id))?;

        account_from_row(&row)
    }

    async fn update_account_balance(
        &mut self,
        id: AccountId,
        balance: i64,
    ) -> Result<Account, LedgerError> {
        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance = $2 WHERE id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(balance)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(id))?;

        account_from_row(&row)
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: i64,
    ) -> Result<Entry, LedgerError> {
        let row = sqlx::query(&format!(
            "INSERT INTO entries (account_id, amount) VALUES ($1, $2) RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(account_id)
        .bind(amount)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| missing_account_or(e, account_id))?;

        entry_from_row(&row)
    }

    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        let row = sqlx::query(&format!(
            "INSERT INTO transfers (from_account_id, to_account_id, amount) \
             VALUES ($1, $2, $3) RETURNING {}",
            TRANSFER_COLUMNS
        ))
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(amount)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| {
            let missing = if violated_constraint(&e) == Some(TRANSFER_TO_ACCOUNT_FKEY) {
                to_account_id
            } else {
                from_account_id
            };
            missing_account_or(e, missing)
        })?;

        transfer_from_row(&row)
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, LedgerError> {
    let currency: String = row.try_get("currency")?;

    Ok(Account {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        balance: row.try_get("balance")?,
        currency: currency.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<Entry, LedgerError> {
    Ok(Entry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer, LedgerError> {
    Ok(Transfer {
        id: row.try_get("id")?,
        from_account_id: row.try_get("from_account_id")?,
        to_account_id: row.try_get("to_account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn violated_constraint(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(db_error) => db_error.constraint(),
        _ => None,
    }
}

/// Foreign key violations mean a referenced account does not exist
fn missing_account_or(error: sqlx::Error, account_id: AccountId) -> LedgerError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_foreign_key_violation() => {
            LedgerError::account_not_found(account_id)
        }
        _ => error.into(),
    }
}
