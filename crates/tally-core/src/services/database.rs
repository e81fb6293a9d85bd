//! Shared database service wrapper.
//!
//! `DatabaseService` is the only way the engine touches storage. Every method
//! takes the connection lock once, so multi-step mutations (append and
//! compact, mint and insert, promote) never interleave with each other.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::backup::BackupLog;
use crate::balance::BalancePropagator;
use crate::db::{
    AccountRepository, CategoryRepository, Database, LibSqlAccountRepository,
    LibSqlCategoryRepository, LibSqlMetaRepository, LibSqlTransactionRepository, MetaRepository,
    TransactionRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    AccountUpdateBody, BackupMutation, BackupOperation, BackupOperationId, BackupPayload,
    BankAccount, Category, EntityType, NewTransaction, Transaction, TransactionRequestBody,
};
use crate::reconcile::{self, MergeReport};

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable: {}. Moving it aside and starting fresh.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_file(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_file(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = crate::util::now_millis();
            let file_name = db_path
                .file_name()
                .map_or_else(|| "tally.db".into(), |name| name.to_string_lossy());
            let backup_path = db_path.with_file_name(format!("{file_name}.corrupt-{timestamp}"));
            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    pub async fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let db = self.db.lock().await;
        LibSqlTransactionRepository::new(db.connection())
            .get(id)
            .await
    }

    /// All transactions newest-first.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let db = self.db.lock().await;
        LibSqlTransactionRepository::new(db.connection())
            .list()
            .await
    }

    pub async fn list_account_transactions(&self, account_id: i64) -> Result<Vec<Transaction>> {
        let db = self.db.lock().await;
        LibSqlTransactionRepository::new(db.connection())
            .list_for_account(account_id)
            .await
    }

    pub async fn list_transactions_in_range(
        &self,
        account_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let db = self.db.lock().await;
        LibSqlTransactionRepository::new(db.connection())
            .list_range(account_id, from, to)
            .await
    }

    /// Store a transaction without touching the backup log.
    pub async fn upsert_transaction(&self, transaction: &Transaction) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlTransactionRepository::new(db.connection())
            .upsert(transaction)
            .await
    }

    /// Store a server-confirmed transaction and drop its queued operations.
    ///
    /// The balance moves by the difference to the row previously stored under
    /// the same id, or by the full amount for a new row.
    pub async fn store_synced_transaction(&self, transaction: &Transaction) -> Result<()> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let transactions = LibSqlTransactionRepository::new(&tx);
        let previous = transactions.get(transaction.id).await?;

        transactions.upsert(transaction).await?;
        BackupLog::new(&tx)
            .remove_all(transaction.id, EntityType::Transaction)
            .await?;
        let balances = BalancePropagator::new(&tx);
        match previous {
            Some(previous) => balances.on_transaction_updated(&previous, transaction).await?,
            None => balances.on_transaction_created(transaction).await?,
        };
        tx.commit().await?;
        Ok(())
    }

    /// Delete a transaction the server confirmed as gone, with its queued
    /// operations and its balance effect.
    pub async fn remove_synced_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let transactions = LibSqlTransactionRepository::new(&tx);
        let previous = transactions.get(id).await?;

        transactions.delete(id).await?;
        BackupLog::new(&tx)
            .remove_all(id, EntityType::Transaction)
            .await?;
        if let Some(previous) = &previous {
            BalancePropagator::new(&tx)
                .on_transaction_deleted(previous)
                .await?;
        }
        tx.commit().await?;
        Ok(previous)
    }

    /// Store a new transaction under a fresh local id and queue its creation.
    pub async fn create_local_transaction(&self, draft: NewTransaction) -> Result<Transaction> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let transactions = LibSqlTransactionRepository::new(&tx);

        let lowest = transactions.min_id().await?;
        let id = LibSqlMetaRepository::new(&tx).next_local_id(lowest).await?;
        let transaction = draft.into_transaction(id)?;

        transactions.upsert(&transaction).await?;
        BackupLog::new(&tx)
            .append(BackupOperation::create_transaction(
                id,
                transaction.to_request_body(),
            ))
            .await?;
        BalancePropagator::new(&tx)
            .on_transaction_created(&transaction)
            .await?;
        tx.commit().await?;

        tracing::debug!("Stored local transaction {id} for later sync");
        Ok(transaction)
    }

    /// Store an edited transaction locally, queue the update, and move the
    /// balance by the difference to the stored row.
    pub async fn update_local_transaction(&self, transaction: &Transaction) -> Result<()> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let transactions = LibSqlTransactionRepository::new(&tx);
        let previous = transactions
            .get(transaction.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", transaction.id)))?;

        transactions.upsert(transaction).await?;
        BackupLog::new(&tx)
            .append(BackupOperation::update_transaction(
                transaction.id,
                transaction.to_request_body(),
            ))
            .await?;
        BalancePropagator::new(&tx)
            .on_transaction_updated(&previous, transaction)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete a transaction locally, queue the delete, and reverse its balance effect.
    pub async fn delete_local_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let transactions = LibSqlTransactionRepository::new(&tx);
        let previous = transactions.get(id).await?;

        transactions.delete(id).await?;
        BackupLog::new(&tx)
            .append(BackupOperation::delete_transaction(id))
            .await?;
        if let Some(previous) = &previous {
            BalancePropagator::new(&tx)
                .on_transaction_deleted(previous)
                .await?;
        }
        tx.commit().await?;
        Ok(previous)
    }

    /// Swap a local transaction row for its server-confirmed version after a
    /// replayed create.
    ///
    /// Local changes made while the create was in flight are carried over:
    /// a newer queued payload is promoted and re-queued as an update for the
    /// server id, and a row deleted in the meantime becomes a queued delete.
    pub async fn promote_transaction(
        &self,
        local_id: i64,
        server_id: i64,
        replayed: &TransactionRequestBody,
    ) -> Result<Option<Transaction>> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let log = BackupLog::new(&tx);

        if LibSqlTransactionRepository::new(&tx)
            .get(local_id)
            .await?
            .is_none()
        {
            log.remove_all(local_id, EntityType::Transaction).await?;
            log.append(BackupOperation::delete_transaction(server_id))
                .await?;
            tx.commit().await?;
            tracing::info!(
                "Local transaction {local_id} was deleted during sync; queued delete of {server_id}"
            );
            return Ok(None);
        }

        let newer = log
            .list_for_entity(local_id, EntityType::Transaction)
            .await?
            .into_iter()
            .find_map(|op| match op.mutation {
                BackupMutation::Create(BackupPayload::Transaction(body)) if body != *replayed => {
                    Some(body)
                }
                _ => None,
            });

        let promoted = reconcile::promote_local_transaction(
            &tx,
            local_id,
            server_id,
            newer.as_ref().unwrap_or(replayed),
        )
        .await?;
        if let Some(body) = newer {
            log.append(BackupOperation::update_transaction(server_id, body))
                .await?;
        }
        tx.commit().await?;
        Ok(Some(promoted))
    }

    /// Store the server's answer to a replayed update unless a newer local
    /// change for the same transaction is queued behind it.
    pub async fn apply_confirmed_transaction(
        &self,
        replayed: &BackupOperationId,
        confirmed: &Transaction,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let newer_pending = BackupLog::new(&tx)
            .list_for_entity(confirmed.id, EntityType::Transaction)
            .await?
            .iter()
            .any(|op| op.id != *replayed);
        if !newer_pending {
            LibSqlTransactionRepository::new(&tx)
                .upsert(confirmed)
                .await?;
        }
        tx.commit().await?;
        Ok(!newer_pending)
    }

    /// Merge an authoritative server listing into local storage.
    pub async fn merge_server_transactions(&self, rows: &[Transaction]) -> Result<MergeReport> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let report = reconcile::merge_server_transactions(&tx, rows).await?;
        tx.commit().await?;
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    pub async fn get_account(&self, id: i64) -> Result<Option<BankAccount>> {
        let db = self.db.lock().await;
        LibSqlAccountRepository::new(db.connection()).get(id).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<BankAccount>> {
        let db = self.db.lock().await;
        LibSqlAccountRepository::new(db.connection()).list().await
    }

    /// Store an account without touching the backup log.
    pub async fn upsert_account(&self, account: &BankAccount) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlAccountRepository::new(db.connection())
            .upsert(account)
            .await
    }

    /// Store a server-confirmed account and drop its queued operations.
    ///
    /// While transaction changes are queued the stored balance is kept; the
    /// server's balance does not include them yet.
    pub async fn store_synced_account(&self, confirmed: &BankAccount) -> Result<BankAccount> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let accounts = LibSqlAccountRepository::new(&tx);
        let local_balance = accounts
            .get(confirmed.id)
            .await?
            .map_or(confirmed.balance, |local| local.balance);
        let account = reconcile::settle_confirmed_account(&tx, confirmed, local_balance).await?;
        accounts.upsert(&account).await?;
        BackupLog::new(&tx)
            .remove_all(account.id, EntityType::Account)
            .await?;
        tx.commit().await?;
        Ok(account)
    }

    /// Store a new account under a fresh local id and queue its creation.
    pub async fn create_local_account(&self, account: &BankAccount) -> Result<BankAccount> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let accounts = LibSqlAccountRepository::new(&tx);
        let lowest = accounts.list().await?.iter().map(|a| a.id).min();
        let id = LibSqlMetaRepository::new(&tx).next_local_id(lowest).await?;
        let account = BankAccount {
            id,
            ..account.clone()
        };

        accounts.upsert(&account).await?;
        BackupLog::new(&tx)
            .append(BackupOperation::create_account(id, account.to_update_body()))
            .await?;
        tx.commit().await?;

        tracing::debug!("Stored local account {id} for later sync");
        Ok(account)
    }

    /// Delete an account locally and queue the delete.
    pub async fn delete_local_account(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let existed = LibSqlAccountRepository::new(&tx).delete(id).await?;
        BackupLog::new(&tx)
            .append(BackupOperation::delete_account(id))
            .await?;
        tx.commit().await?;
        Ok(existed)
    }

    /// Delete an account the server confirmed as gone, with its queued operations.
    pub async fn remove_synced_account(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let existed = LibSqlAccountRepository::new(&tx).delete(id).await?;
        BackupLog::new(&tx).remove_all(id, EntityType::Account).await?;
        tx.commit().await?;
        Ok(existed)
    }

    /// Store an edited account locally and queue the update.
    pub async fn update_local_account(&self, account: &BankAccount) -> Result<()> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        LibSqlAccountRepository::new(&tx).upsert(account).await?;
        BackupLog::new(&tx)
            .append(BackupOperation::update_account(
                account.id,
                account.to_update_body(),
            ))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Swap a locally created account for its server-confirmed version.
    ///
    /// Transactions stored or queued against the local id follow it to the
    /// server id.
    pub async fn promote_account(
        &self,
        local_id: i64,
        server_id: i64,
        body: &AccountUpdateBody,
    ) -> Result<BankAccount> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let accounts = LibSqlAccountRepository::new(&tx);
        // Keep the locally maintained balance; it already reflects queued transactions
        let mut promoted = BankAccount::from_update_body(server_id, body)?;
        if let Some(local) = accounts.get(local_id).await? {
            promoted.balance = local.balance;
        }
        accounts.delete(local_id).await?;
        accounts.upsert(&promoted).await?;
        BackupLog::new(&tx)
            .remove_all(local_id, EntityType::Account)
            .await?;
        reconcile::repoint_account(&tx, local_id, server_id).await?;
        tx.commit().await?;
        tracing::info!("Promoted local account {local_id} to server id {server_id}");
        Ok(promoted)
    }

    /// Store the server's answer to a replayed account update unless a newer
    /// local change is queued behind it.
    ///
    /// The local balance is kept while transaction changes are queued.
    pub async fn apply_confirmed_account(
        &self,
        replayed: &BackupOperationId,
        confirmed: &BankAccount,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let newer_pending = BackupLog::new(&tx)
            .list_for_entity(confirmed.id, EntityType::Account)
            .await?
            .iter()
            .any(|op| op.id != *replayed);
        if !newer_pending {
            let accounts = LibSqlAccountRepository::new(&tx);
            let local_balance = accounts
                .get(confirmed.id)
                .await?
                .map_or(confirmed.balance, |local| local.balance);
            let account =
                reconcile::settle_confirmed_account(&tx, confirmed, local_balance).await?;
            accounts.upsert(&account).await?;
        }
        tx.commit().await?;
        Ok(!newer_pending)
    }

    /// Merge server accounts unless queued local changes should win.
    pub async fn merge_server_accounts(&self, accounts: &[BankAccount]) -> Result<usize> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let stored = reconcile::merge_server_accounts(&tx, accounts).await?;
        tx.commit().await?;
        Ok(stored)
    }

    /// Add `delta` to an account balance as one read-modify-write.
    pub async fn apply_balance_delta(&self, account_id: i64, delta: Decimal) -> Result<BankAccount> {
        let db = self.db.lock().await;
        BalancePropagator::new(db.connection())
            .apply_delta(account_id, delta)
            .await
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    pub async fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let db = self.db.lock().await;
        LibSqlCategoryRepository::new(db.connection()).get(id).await
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let db = self.db.lock().await;
        LibSqlCategoryRepository::new(db.connection()).list().await
    }

    pub async fn upsert_categories(&self, categories: &[Category]) -> Result<()> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let repo = LibSqlCategoryRepository::new(&tx);
        for category in categories {
            repo.upsert(category).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Backup log
    // -----------------------------------------------------------------------

    /// Append and compact in one step.
    pub async fn append_backup(&self, operation: BackupOperation) -> Result<Option<BackupOperation>> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let pending = BackupLog::new(&tx).append(operation).await?;
        tx.commit().await?;
        Ok(pending)
    }

    pub async fn compact_backup(
        &self,
        entity_id: i64,
        entity_type: EntityType,
    ) -> Result<Option<BackupOperation>> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let pending = BackupLog::new(&tx).compact(entity_id, entity_type).await?;
        tx.commit().await?;
        Ok(pending)
    }

    /// Pending operations in replay order.
    pub async fn list_backup_operations(&self) -> Result<Vec<BackupOperation>> {
        let db = self.db.lock().await;
        BackupLog::new(db.connection()).list().await
    }

    pub async fn get_backup_operation(
        &self,
        id: &BackupOperationId,
    ) -> Result<Option<BackupOperation>> {
        let db = self.db.lock().await;
        BackupLog::new(db.connection()).get(id).await
    }

    pub async fn backup_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        BackupLog::new(db.connection()).count().await
    }

    pub async fn remove_backup_operation(&self, id: &BackupOperationId) -> Result<bool> {
        let db = self.db.lock().await;
        BackupLog::new(db.connection()).remove(id).await
    }

    /// Remove several operations atomically.
    pub async fn remove_backup_operations(&self, ids: &[BackupOperationId]) -> Result<usize> {
        let db = self.db.lock().await;
        let tx = db.begin().await?;
        let log = BackupLog::new(&tx);
        let mut removed = 0;
        for id in ids {
            if log.remove(id).await? {
                removed += 1;
            }
        }
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn record_backup_failure(&self, id: &BackupOperationId, message: &str) -> Result<()> {
        let db = self.db.lock().await;
        BackupLog::new(db.connection())
            .record_failure(id, message)
            .await
    }
}
