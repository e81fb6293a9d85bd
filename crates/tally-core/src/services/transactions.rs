//! Transaction operations with offline fallback.

use chrono::{DateTime, Days, NaiveDate, Utc};

use super::ServiceContext;
use crate::error::{Error, Result};
use crate::models::{NewTransaction, Transaction};
use crate::network::ExecutionPath;

pub struct TransactionsService {
    context: ServiceContext,
}

impl TransactionsService {
    pub(crate) const fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Transactions of one account dated within `[from, to]`, newest first.
    ///
    /// Syncs pending changes first. Online, the server listing is merged into
    /// the local store and returned; otherwise local rows are returned,
    /// including ones that have not reached the server.
    pub async fn fetch_transactions(
        &self,
        account_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        if from > to {
            return Err(Error::InvalidInput(format!(
                "start date {from} is after end date {to}"
            )));
        }
        self.context.sync_before_fetch().await;

        let (start, end) = day_bounds(from, to);
        let ctx = &self.context;
        let (mut rows, path) = ctx
            .executor
            .execute_traced(
                "fetch transactions",
                || ctx.remote.fetch_transactions(account_id, from, to),
                || ctx.db.list_transactions_in_range(account_id, start, end),
            )
            .await?;

        if path == ExecutionPath::Remote {
            ctx.db.merge_server_transactions(&rows).await?;
        }
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    /// Create a transaction, queueing it under a local id when the server is unavailable.
    pub async fn create(&self, draft: NewTransaction) -> Result<Transaction> {
        let ctx = &self.context;
        ctx.require_account(draft.account_id).await?;
        let candidate = draft.clone().into_transaction(0)?;
        let body = candidate.to_request_body();

        let (created, path) = ctx
            .executor
            .execute_traced(
                "create transaction",
                || async {
                    let id = ctx.remote.create_transaction(&body).await?;
                    Ok(Transaction {
                        id,
                        ..candidate.clone()
                    })
                },
                || ctx.db.create_local_transaction(draft),
            )
            .await?;

        if path == ExecutionPath::Remote {
            ctx.db.store_synced_transaction(&created).await?;
        }
        tracing::debug!("Created transaction {}", created.id);
        Ok(created)
    }

    /// Update a stored transaction.
    ///
    /// Rows with a local id have not reached the server, so the change is
    /// folded into their queued create.
    pub async fn update(&self, transaction: Transaction) -> Result<Transaction> {
        let ctx = &self.context;
        self.get_required(transaction.id).await?;
        ctx.require_account(transaction.account_id).await?;
        let updated = validated(transaction)?;

        let (stored, path) = if updated.is_local() {
            ctx.db.update_local_transaction(&updated).await?;
            (updated, ExecutionPath::Fallback)
        } else {
            let body = updated.to_request_body();
            ctx.executor
                .execute_traced(
                    "update transaction",
                    || ctx.remote.update_transaction(updated.id, &body),
                    || async {
                        ctx.db.update_local_transaction(&updated).await?;
                        Ok(updated.clone())
                    },
                )
                .await?
        };

        if path == ExecutionPath::Remote {
            ctx.db.store_synced_transaction(&stored).await?;
        }
        Ok(stored)
    }

    /// Delete a stored transaction and return what was removed.
    pub async fn delete(&self, id: i64) -> Result<Transaction> {
        let ctx = &self.context;
        let existing = self.get_required(id).await?;

        let path = if existing.is_local() {
            ctx.db.delete_local_transaction(id).await?;
            ExecutionPath::Fallback
        } else {
            let ((), path) = ctx
                .executor
                .execute_traced(
                    "delete transaction",
                    || async {
                        match ctx.remote.delete_transaction(id).await {
                            Err(error) if error.is_not_found() => Ok(()),
                            other => other,
                        }
                    },
                    || async {
                        ctx.db.delete_local_transaction(id).await?;
                        Ok(())
                    },
                )
                .await?;
            path
        };

        if path == ExecutionPath::Remote {
            ctx.db.remove_synced_transaction(id).await?;
        }
        Ok(existing)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Transaction>> {
        self.context.db.get_transaction(id).await
    }

    /// Every locally stored transaction of an account, newest first.
    pub async fn list_local(&self, account_id: i64) -> Result<Vec<Transaction>> {
        self.context.db.list_account_transactions(account_id).await
    }

    async fn get_required(&self, id: i64) -> Result<Transaction> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("transaction {id}")))
    }
}

fn validated(transaction: Transaction) -> Result<Transaction> {
    let id = transaction.id;
    NewTransaction {
        account_id: transaction.account_id,
        category_id: transaction.category_id,
        direction: transaction.direction,
        amount: transaction.amount,
        transaction_date: transaction.transaction_date,
        comment: transaction.comment,
    }
    .into_transaction(id)
}

/// First instant of `from` through the last millisecond of `to`.
fn day_bounds(from: NaiveDate, to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = from.and_time(chrono::NaiveTime::MIN).and_utc();
    let end = to
        .checked_add_days(Days::new(1))
        .map_or(DateTime::<Utc>::MAX_UTC, |next| {
            next.and_time(chrono::NaiveTime::MIN).and_utc() - chrono::Duration::milliseconds(1)
        });
    (start, end)
}

fn sort_newest_first(rows: &mut [Transaction]) {
    rows.sort_by(|a, b| {
        b.transaction_date
            .cmp(&a.transaction_date)
            .then_with(|| b.id.cmp(&a.id))
    });
}
