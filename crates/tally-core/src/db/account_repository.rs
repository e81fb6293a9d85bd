//! Bank account repository implementation

use std::str::FromStr;

use libsql::{params, Connection, Row};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::BankAccount;

/// Trait for account storage operations (async)
#[allow(async_fn_in_trait)]
pub trait AccountRepository {
    async fn get(&self, id: i64) -> Result<Option<BankAccount>>;

    /// All accounts ordered by id
    async fn list(&self) -> Result<Vec<BankAccount>>;

    /// Insert or replace by id
    async fn upsert(&self, account: &BankAccount) -> Result<()>;

    /// Overwrite the stored balance; returns whether the account exists
    async fn set_balance(&self, id: i64, balance: Decimal) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `AccountRepository`
pub struct LibSqlAccountRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlAccountRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_account(row: &Row) -> Result<BankAccount> {
        let balance: String = row.get(2)?;
        Ok(BankAccount {
            id: row.get(0)?,
            name: row.get(1)?,
            balance: Decimal::from_str(&balance)?,
            currency: row.get(3)?,
        })
    }
}

impl AccountRepository for LibSqlAccountRepository<'_> {
    async fn get(&self, id: i64) -> Result<Option<BankAccount>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, balance, currency FROM accounts WHERE id = ?",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<BankAccount>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, balance, currency FROM accounts ORDER BY id",
                (),
            )
            .await?;

        let mut accounts = Vec::new();
        while let Some(row) = rows.next().await? {
            accounts.push(Self::parse_account(&row)?);
        }
        Ok(accounts)
    }

    async fn upsert(&self, account: &BankAccount) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO accounts (id, name, balance, currency) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    balance = excluded.balance,
                    currency = excluded.currency",
                params![
                    account.id,
                    account.name.clone(),
                    account.balance.to_string(),
                    account.currency.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn set_balance(&self, id: i64, balance: Decimal) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE accounts SET balance = ? WHERE id = ?",
                params![balance.to_string(), id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM accounts WHERE id = ?", [id])
            .await?;
        Ok(affected > 0)
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM accounts", ()).await?;
        Ok(())
    }
}
