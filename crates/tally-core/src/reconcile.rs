//! Local/server reconciliation.
//!
//! Identifier promotion swaps a locally minted transaction row for the
//! server-confirmed one. Server-truth merge stores what the server returned
//! and drops temporary rows that duplicate confirmed ones by natural key.
//! Account promotion re-points transactions that still use the local id.
//! All functions take a connection so callers can run them inside one
//! database transaction.

use std::collections::HashSet;

use libsql::Connection;
use rust_decimal::Decimal;

use crate::backup::BackupLog;
use crate::db::{
    AccountRepository, CategoryRepository, LibSqlAccountRepository, LibSqlCategoryRepository,
    LibSqlTransactionRepository, TransactionRepository,
};
use crate::error::Result;
use crate::models::{
    BackupMutation, BackupPayload, BankAccount, Direction, EntityType, NaturalKey, OperationKind,
    Transaction, TransactionRequestBody,
};

/// Outcome of a server-truth merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub upserted: usize,
    /// Server rows left alone because a local edit or delete is queued
    pub skipped_pending: usize,
    pub duplicates_removed: usize,
}

/// Replace the row stored under `local_id` with the server-confirmed row.
///
/// Drops every queued operation that still references `local_id`. Balances
/// are not touched; the local create already applied its delta.
pub async fn promote_local_transaction(
    conn: &Connection,
    local_id: i64,
    server_id: i64,
    body: &TransactionRequestBody,
) -> Result<Transaction> {
    let transactions = LibSqlTransactionRepository::new(conn);

    let direction = match transactions.get(local_id).await? {
        Some(local) => local.direction,
        None => LibSqlCategoryRepository::new(conn)
            .get(body.category_id)
            .await?
            .map_or(Direction::Outcome, |category| category.direction),
    };

    let promoted = Transaction::from_request_body(server_id, direction, body)?;
    transactions.delete(local_id).await?;
    transactions.upsert(&promoted).await?;
    BackupLog::new(conn)
        .remove_all(local_id, EntityType::Transaction)
        .await?;

    tracing::info!("Promoted local transaction {local_id} to server id {server_id}");
    Ok(promoted)
}

/// Store authoritative server rows, then remove temporary duplicates.
///
/// Rows with a queued update or delete are skipped so the pending local
/// change is neither overwritten nor resurrected.
pub async fn merge_server_transactions(
    conn: &Connection,
    server_rows: &[Transaction],
) -> Result<MergeReport> {
    let transactions = LibSqlTransactionRepository::new(conn);
    let pending = BackupLog::new(conn)
        .pending_entity_ids(
            EntityType::Transaction,
            &[OperationKind::Update, OperationKind::Delete],
        )
        .await?;

    let mut report = MergeReport::default();
    for row in server_rows {
        if pending.contains(&row.id) {
            report.skipped_pending += 1;
            continue;
        }
        transactions.upsert(row).await?;
        report.upserted += 1;
    }

    report.duplicates_removed = remove_temporary_duplicates(conn, server_rows).await?;
    if report.duplicates_removed > 0 || report.skipped_pending > 0 {
        tracing::debug!(
            "Merged {} server transactions ({} skipped with pending changes, {} duplicates removed)",
            report.upserted,
            report.skipped_pending,
            report.duplicates_removed
        );
    }
    Ok(report)
}

/// Delete temporary rows sharing a natural key with a confirmed row.
///
/// A temporary row that still has a queued operation is kept; it has not
/// reached the server yet and so cannot be the confirmed row's twin.
pub async fn remove_temporary_duplicates(
    conn: &Connection,
    confirmed: &[Transaction],
) -> Result<usize> {
    let keys: HashSet<NaturalKey> = confirmed
        .iter()
        .filter(|row| !row.is_local())
        .map(Transaction::natural_key)
        .collect();
    if keys.is_empty() {
        return Ok(0);
    }

    let transactions = LibSqlTransactionRepository::new(conn);
    let queued = BackupLog::new(conn)
        .pending_entity_ids(
            EntityType::Transaction,
            &[
                OperationKind::Create,
                OperationKind::Update,
                OperationKind::Delete,
            ],
        )
        .await?;

    let mut removed = 0;
    for row in transactions.list().await? {
        if row.is_local() && !queued.contains(&row.id) && keys.contains(&row.natural_key()) {
            transactions.delete(row.id).await?;
            tracing::debug!("Removed temporary duplicate transaction {}", row.id);
            removed += 1;
        }
    }
    Ok(removed)
}

/// Store server accounts unless local unsynced state should win.
///
/// While any transaction mutation is queued the local balance already
/// includes its effect, so the server balance would be stale.
pub async fn merge_server_accounts(conn: &Connection, accounts: &[BankAccount]) -> Result<usize> {
    let log = BackupLog::new(conn);
    if log.count_for_type(EntityType::Transaction).await? > 0 {
        tracing::debug!("Keeping local accounts: transaction changes are still queued");
        return Ok(0);
    }

    let pending = log
        .pending_entity_ids(
            EntityType::Account,
            &[
                OperationKind::Create,
                OperationKind::Update,
                OperationKind::Delete,
            ],
        )
        .await?;

    let repo = LibSqlAccountRepository::new(conn);
    let mut stored = 0;
    for account in accounts.iter().filter(|account| !pending.contains(&account.id)) {
        repo.upsert(account).await?;
        stored += 1;
    }
    Ok(stored)
}

/// The account to store for a server confirmation.
///
/// Name and currency come from the server. While transaction changes are
/// queued the server balance misses them, so `local_balance` is kept.
pub async fn settle_confirmed_account(
    conn: &Connection,
    confirmed: &BankAccount,
    local_balance: Decimal,
) -> Result<BankAccount> {
    if BackupLog::new(conn)
        .count_for_type(EntityType::Transaction)
        .await?
        == 0
    {
        return Ok(confirmed.clone());
    }

    if confirmed.balance != local_balance {
        tracing::debug!(
            "Keeping local balance {local_balance} for account {}: transaction changes are still queued",
            confirmed.id
        );
    }
    Ok(BankAccount {
        balance: local_balance,
        ..confirmed.clone()
    })
}

/// Move transactions stored or queued under a local account id to `server_id`.
///
/// Returns how many rows and queued payloads were rewritten.
pub async fn repoint_account(conn: &Connection, local_id: i64, server_id: i64) -> Result<usize> {
    let transactions = LibSqlTransactionRepository::new(conn);
    let mut rewritten = 0;
    for mut row in transactions.list_for_account(local_id).await? {
        row.account_id = server_id;
        transactions.upsert(&row).await?;
        rewritten += 1;
    }

    let log = BackupLog::new(conn);
    for mut op in log.list().await? {
        let body = match &mut op.mutation {
            BackupMutation::Create(BackupPayload::Transaction(body))
            | BackupMutation::Update(BackupPayload::Transaction(body)) => body,
            _ => continue,
        };
        if body.account_id != local_id {
            continue;
        }
        body.account_id = server_id;
        log.rewrite(&op).await?;
        rewritten += 1;
    }

    if rewritten > 0 {
        tracing::debug!(
            "Re-pointed {rewritten} transaction record(s) from account {local_id} to {server_id}"
        );
    }
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{BackupOperation, Category};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn row(id: i64, amount: rust_decimal::Decimal, day: u32) -> Transaction {
        Transaction {
            id,
            account_id: 1,
            category_id: 4,
            direction: Direction::Outcome,
            amount,
            transaction_date: Utc.with_ymd_and_hms(2025, 5, day, 8, 0, 0).unwrap(),
            comment: None,
        }
    }

    async fn ids(conn: &Connection) -> Vec<i64> {
        let mut ids: Vec<i64> = LibSqlTransactionRepository::new(conn)
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn promotion_replaces_local_row_and_clears_log() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();
        let local = row(-7, dec!(30), 2);
        LibSqlTransactionRepository::new(conn)
            .upsert(&local)
            .await
            .unwrap();
        BackupLog::new(conn)
            .append(BackupOperation::create_transaction(
                -7,
                local.to_request_body(),
            ))
            .await
            .unwrap();

        let promoted = promote_local_transaction(conn, -7, 99, &local.to_request_body())
            .await
            .unwrap();

        assert_eq!(promoted.id, 99);
        assert_eq!(promoted.direction, Direction::Outcome);
        assert_eq!(ids(conn).await, vec![99]);
        assert!(BackupLog::new(conn)
            .list_for_entity(-7, EntityType::Transaction)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn promotion_without_local_row_uses_category_direction() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();
        LibSqlCategoryRepository::new(conn)
            .upsert(&Category {
                id: 4,
                name: "Salary".to_string(),
                emoji: "💰".to_string(),
                direction: Direction::Income,
            })
            .await
            .unwrap();

        let body = row(-2, dec!(10), 2).to_request_body();
        let promoted = promote_local_transaction(conn, -2, 5, &body).await.unwrap();
        assert_eq!(promoted.direction, Direction::Income);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_removes_synced_temporary_twin_and_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();
        let repo = LibSqlTransactionRepository::new(conn);

        // -1 lost its queued op after a sync whose local promotion failed
        repo.upsert(&row(-1, dec!(12.5), 3)).await.unwrap();
        // -2 is still queued for creation
        let queued = row(-2, dec!(40), 4);
        repo.upsert(&queued).await.unwrap();
        BackupLog::new(conn)
            .append(BackupOperation::create_transaction(
                -2,
                queued.to_request_body(),
            ))
            .await
            .unwrap();

        let server = vec![row(10, dec!(12.50), 3), row(11, dec!(40), 4)];
        let first = merge_server_transactions(conn, &server).await.unwrap();
        assert_eq!(first.upserted, 2);
        assert_eq!(first.duplicates_removed, 1);
        let after_first = ids(conn).await;
        assert_eq!(after_first, vec![-2, 10, 11]);

        let second = merge_server_transactions(conn, &server).await.unwrap();
        assert_eq!(second.duplicates_removed, 0);
        assert_eq!(ids(conn).await, after_first);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_skips_rows_with_queued_changes() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();
        let repo = LibSqlTransactionRepository::new(conn);

        let mut edited = row(20, dec!(1), 1);
        edited.comment = Some("local edit".to_string());
        repo.upsert(&edited).await.unwrap();
        BackupLog::new(conn)
            .append(BackupOperation::update_transaction(
                20,
                edited.to_request_body(),
            ))
            .await
            .unwrap();
        BackupLog::new(conn)
            .append(BackupOperation::delete_transaction(21))
            .await
            .unwrap();

        let server = vec![row(20, dec!(1), 1), row(21, dec!(2), 1)];
        let report = merge_server_transactions(conn, &server).await.unwrap();

        assert_eq!(report.skipped_pending, 2);
        assert_eq!(report.upserted, 0);
        assert_eq!(
            repo.get(20).await.unwrap().unwrap().comment.as_deref(),
            Some("local edit")
        );
        assert!(repo.get(21).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn distinct_server_rows_with_same_key_are_both_kept() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();

        let server = vec![row(30, dec!(5), 6), row(31, dec!(5), 6)];
        merge_server_transactions(conn, &server).await.unwrap();
        assert_eq!(ids(conn).await, vec![30, 31]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accounts_are_not_overwritten_while_transactions_are_queued() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();
        let account = BankAccount {
            id: 1,
            name: "Main".to_string(),
            balance: dec!(500),
            currency: "USD".to_string(),
        };

        BackupLog::new(conn)
            .append(BackupOperation::delete_transaction(3))
            .await
            .unwrap();
        assert_eq!(
            merge_server_accounts(conn, &[account.clone()]).await.unwrap(),
            0
        );

        BackupLog::new(conn).clear().await.unwrap();
        assert_eq!(merge_server_accounts(conn, &[account]).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn confirmed_account_keeps_local_balance_only_while_transactions_are_queued() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();
        let confirmed = BankAccount {
            id: 1,
            name: "Everyday".to_string(),
            balance: dec!(0),
            currency: "EUR".to_string(),
        };

        let settled = settle_confirmed_account(conn, &confirmed, dec!(30))
            .await
            .unwrap();
        assert_eq!(settled, confirmed);

        BackupLog::new(conn)
            .append(BackupOperation::delete_transaction(3))
            .await
            .unwrap();
        let settled = settle_confirmed_account(conn, &confirmed, dec!(30))
            .await
            .unwrap();
        assert_eq!(settled.balance, dec!(30));
        assert_eq!(settled.name, "Everyday");
        assert_eq!(settled.currency, "EUR");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repoint_moves_rows_and_queued_bodies() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();
        let repo = LibSqlTransactionRepository::new(conn);
        let log = BackupLog::new(conn);

        let mut local = row(-4, dec!(8), 9);
        local.account_id = -2;
        repo.upsert(&local).await.unwrap();
        log.append(BackupOperation::create_transaction(-4, local.to_request_body()))
            .await
            .unwrap();
        let untouched = row(15, dec!(3), 9);
        repo.upsert(&untouched).await.unwrap();
        log.append(BackupOperation::update_transaction(
            15,
            untouched.to_request_body(),
        ))
        .await
        .unwrap();
        let before = log.list().await.unwrap();

        assert_eq!(repoint_account(conn, -2, 6).await.unwrap(), 2);

        assert_eq!(repo.get(-4).await.unwrap().unwrap().account_id, 6);
        assert_eq!(repo.get(15).await.unwrap().unwrap().account_id, 1);
        let after = log.list().await.unwrap();
        assert_eq!(after.len(), 2);
        let create = after.iter().find(|op| op.entity_id == -4).unwrap();
        assert_eq!(create.id, before[0].id);
        assert_eq!(create.timestamp, before[0].timestamp);
        match &create.mutation {
            BackupMutation::Create(BackupPayload::Transaction(body)) => {
                assert_eq!(body.account_id, 6);
            }
            other => panic!("unexpected mutation {other:?}"),
        }
        let update = after.iter().find(|op| op.entity_id == 15).unwrap();
        assert_eq!(update, &before[1]);
    }
}
