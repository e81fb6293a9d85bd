//! Transaction repository implementation

use std::str::FromStr;

use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::models::{Direction, Transaction};

const COLUMNS: &str =
    "id, account_id, category_id, direction, amount, transaction_date, comment";

/// Trait for transaction storage operations (async)
#[allow(async_fn_in_trait)]
pub trait TransactionRepository {
    async fn get(&self, id: i64) -> Result<Option<Transaction>>;

    /// All transactions, newest first
    async fn list(&self) -> Result<Vec<Transaction>>;

    /// Transactions of one account, newest first
    async fn list_for_account(&self, account_id: i64) -> Result<Vec<Transaction>>;

    /// Transactions of one account dated within `[from, to]`, newest first
    async fn list_range(
        &self,
        account_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>>;

    /// Insert or replace by id
    async fn upsert(&self, transaction: &Transaction) -> Result<()>;

    /// Delete by id; returns whether a row existed
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    /// Lowest id in the table, if any
    async fn min_id(&self) -> Result<Option<i64>>;
}

/// libSQL implementation of `TransactionRepository`
pub struct LibSqlTransactionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTransactionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_transaction(row: &Row) -> Result<Transaction> {
        let direction: String = row.get(3)?;
        let amount: String = row.get(4)?;
        let date_ms: i64 = row.get(5)?;
        let transaction_date = DateTime::from_timestamp_millis(date_ms).ok_or_else(|| {
            Error::Database(format!("transaction date out of range: {date_ms}"))
        })?;

        Ok(Transaction {
            id: row.get(0)?,
            account_id: row.get(1)?,
            category_id: row.get(2)?,
            direction: Direction::from_str(&direction)?,
            amount: Decimal::from_str(&amount)?,
            transaction_date,
            comment: row.get(6)?,
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::new();
        while let Some(row) = rows.next().await? {
            transactions.push(Self::parse_transaction(&row)?);
        }
        Ok(transactions)
    }
}

impl TransactionRepository for LibSqlTransactionRepository<'_> {
    async fn get(&self, id: i64) -> Result<Option<Transaction>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {COLUMNS} FROM transactions WHERE id = ?"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_transaction(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Transaction>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM transactions ORDER BY transaction_date DESC, id DESC"
                ),
                (),
            )
            .await?;
        Self::collect(rows).await
    }

    async fn list_for_account(&self, account_id: i64) -> Result<Vec<Transaction>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM transactions WHERE account_id = ?
                     ORDER BY transaction_date DESC, id DESC"
                ),
                [account_id],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn list_range(
        &self,
        account_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM transactions
                     WHERE account_id = ? AND transaction_date >= ? AND transaction_date <= ?
                     ORDER BY transaction_date DESC, id DESC"
                ),
                params![account_id, from.timestamp_millis(), to.timestamp_millis()],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn upsert(&self, transaction: &Transaction) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO transactions
                    (id, account_id, category_id, direction, amount, transaction_date, comment)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    account_id = excluded.account_id,
                    category_id = excluded.category_id,
                    direction = excluded.direction,
                    amount = excluded.amount,
                    transaction_date = excluded.transaction_date,
                    comment = excluded.comment",
                params![
                    transaction.id,
                    transaction.account_id,
                    transaction.category_id,
                    transaction.direction.as_str(),
                    transaction.amount.to_string(),
                    transaction.transaction_date.timestamp_millis(),
                    transaction.comment.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM transactions WHERE id = ?", [id])
            .await?;
        Ok(affected > 0)
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM transactions", ()).await?;
        Ok(())
    }

    async fn min_id(&self) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query("SELECT MIN(id) FROM transactions", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<i64>>(0)?),
            None => Ok(None),
        }
    }
}
