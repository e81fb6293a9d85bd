//! Sync orchestrator: drains the backup log against the remote service.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use super::SyncStatusBroadcaster;
use crate::error::{Error, Result};
use crate::models::{
    BackupMutation, BackupOperation, BackupOperationId, BackupPayload, ConflictInfo, EntityType,
    SyncError, SyncProgress, SyncStatus,
};
use crate::remote::{RemoteError, RemoteService};
use crate::services::DatabaseService;
use crate::util::compact_text;

/// Default retry count after which a pending operation is reported as stuck
pub const DEFAULT_STUCK_AFTER_ATTEMPTS: u32 = 5;

/// Result of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Operations replayed successfully and removed from the log
    pub synced: Vec<BackupOperationId>,
    /// Operations that failed without a conflict; still queued
    pub failed: Vec<BackupOperationId>,
    /// Pending operations at or over the retry threshold
    pub stuck: Vec<BackupOperationId>,
    pub conflict: Option<ConflictInfo>,
    /// Operations left in the log after the pass
    pub remaining: usize,
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.conflict.is_none() && self.remaining == 0
    }
}

enum Replay {
    Synced,
    Conflict(String),
    Failed(String),
}

pub struct SyncOrchestrator {
    db: DatabaseService,
    remote: Arc<dyn RemoteService>,
    status: Arc<SyncStatusBroadcaster>,
    stuck_after_attempts: u32,
    pass_lock: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(
        db: DatabaseService,
        remote: Arc<dyn RemoteService>,
        status: Arc<SyncStatusBroadcaster>,
    ) -> Self {
        Self {
            db,
            remote,
            status,
            stuck_after_attempts: DEFAULT_STUCK_AFTER_ATTEMPTS,
            pass_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn with_stuck_after_attempts(mut self, attempts: u32) -> Self {
        self.stuck_after_attempts = attempts;
        self
    }

    pub fn status(&self) -> &Arc<SyncStatusBroadcaster> {
        &self.status
    }

    /// Replay every pending operation once, in timestamp order.
    ///
    /// A conflict stops the pass; the conflicting operation and everything
    /// after it stay queued. Other remote failures leave the operation queued
    /// and move on. Only local storage failures are returned as errors.
    pub async fn sync_all(&self) -> Result<SyncOutcome> {
        let _pass = self.pass_lock.lock().await;

        let operations = match self.db.list_backup_operations().await {
            Ok(operations) => operations,
            Err(error) => return Err(self.storage_failure(error)),
        };
        if operations.is_empty() {
            return Ok(SyncOutcome::default());
        }

        let total = operations.len();
        tracing::info!("Starting sync of {total} pending operation(s)");
        self.status.update_status(SyncStatus::Syncing);
        self.status
            .update_progress(SyncProgress::new(total, 0, "Preparing sync"));

        let mut outcome = SyncOutcome::default();
        for (index, listed) in operations.iter().enumerate() {
            self.status
                .update_progress(SyncProgress::new(total, index, describe(listed)));

            // Earlier replays in this pass may have rewritten or dropped it
            let operation = match self.db.get_backup_operation(&listed.id).await {
                Ok(Some(operation)) => operation,
                Ok(None) => {
                    tracing::debug!("Skipping {}: no longer queued", describe(listed));
                    continue;
                }
                Err(error) => return Err(self.storage_failure(error)),
            };

            match self.replay(&operation).await {
                Replay::Synced => {
                    tracing::debug!("Synced {}", describe(&operation));
                    outcome.synced.push(operation.id);
                }
                Replay::Conflict(message) => {
                    tracing::warn!("Conflict while syncing {}: {message}", describe(&operation));
                    outcome.conflict = Some(ConflictInfo {
                        entity_id: operation.entity_id,
                        entity_type: operation.entity_type,
                        message,
                    });
                    break;
                }
                Replay::Failed(message) => {
                    tracing::warn!("Failed to sync {}: {message}", describe(&operation));
                    if let Err(error) = self
                        .db
                        .record_backup_failure(&operation.id, &message)
                        .await
                    {
                        return Err(self.storage_failure(error));
                    }
                    outcome.failed.push(operation.id);
                }
            }
        }

        if let Err(error) = self.finish_pass(total, &mut outcome).await {
            return Err(self.storage_failure(error));
        }
        Ok(outcome)
    }

    /// Recount pending operations and publish the counts.
    pub async fn refresh_unsynced_count(&self) -> Result<usize> {
        let pending = self.db.list_backup_operations().await?;
        let stuck = self.stuck_ids(&pending).len();
        self.status.set_unsynced_count(pending.len());
        self.status.set_stuck_count(stuck);
        Ok(pending.len())
    }

    async fn finish_pass(&self, total: usize, outcome: &mut SyncOutcome) -> Result<()> {
        self.db.remove_backup_operations(&outcome.synced).await?;

        let pending = self.db.list_backup_operations().await?;
        outcome.remaining = pending.len();
        outcome.stuck = self.stuck_ids(&pending);
        for operation in pending
            .iter()
            .filter(|op| op.attempts >= self.stuck_after_attempts)
        {
            tracing::warn!(
                "{} has failed {} times: {}",
                describe(operation),
                operation.attempts,
                operation.last_error.as_deref().unwrap_or("unknown error")
            );
        }

        self.status.set_unsynced_count(outcome.remaining);
        self.status.set_stuck_count(outcome.stuck.len());
        self.status.update_progress(SyncProgress::new(
            total,
            outcome.synced.len(),
            "Sync finished",
        ));

        let status = if let Some(conflict) = outcome.conflict.clone() {
            SyncStatus::Conflict(conflict)
        } else if outcome.remaining == 0 {
            SyncStatus::Completed
        } else {
            SyncStatus::Failed(SyncError::UnsyncedOperations(outcome.remaining))
        };
        tracing::info!(
            "Sync finished: {} synced, {} failed, {} remaining",
            outcome.synced.len(),
            outcome.failed.len(),
            outcome.remaining
        );
        self.status.update_status(status);
        Ok(())
    }

    fn stuck_ids(&self, pending: &[BackupOperation]) -> Vec<BackupOperationId> {
        pending
            .iter()
            .filter(|op| op.attempts >= self.stuck_after_attempts)
            .map(|op| op.id)
            .collect()
    }

    fn storage_failure(&self, error: Error) -> Error {
        tracing::error!("Sync aborted by local storage failure: {error}");
        self.status
            .update_status(SyncStatus::Failed(SyncError::Storage(error.to_string())));
        error
    }

    async fn replay(&self, operation: &BackupOperation) -> Replay {
        let id = operation.entity_id;
        match &operation.mutation {
            BackupMutation::Create(BackupPayload::Transaction(body)) => {
                match self.remote.create_transaction(body).await {
                    Ok(server_id) => {
                        if let Err(error) = self.db.promote_transaction(id, server_id, body).await
                        {
                            tracing::warn!(
                                "Transaction {id} reached the server as {server_id} but local promotion failed: {error}"
                            );
                        }
                        Replay::Synced
                    }
                    Err(error) => classify(&error, false),
                }
            }
            BackupMutation::Update(BackupPayload::Transaction(body)) => {
                if id < 0 {
                    return Replay::Failed(format!(
                        "transaction {id} has not been created on the server"
                    ));
                }
                match self.remote.update_transaction(id, body).await {
                    Ok(confirmed) => {
                        if let Err(error) = self
                            .db
                            .apply_confirmed_transaction(&operation.id, &confirmed)
                            .await
                        {
                            tracing::warn!("Failed to store confirmed transaction {id}: {error}");
                        }
                        Replay::Synced
                    }
                    Err(error) => classify(&error, true),
                }
            }
            BackupMutation::Delete if operation.entity_type == EntityType::Transaction => {
                match self.remote.delete_transaction(id).await {
                    Ok(()) => Replay::Synced,
                    Err(error) if error.is_not_found() => {
                        tracing::debug!("Transaction {id} was already gone on the server");
                        Replay::Synced
                    }
                    Err(error) => classify(&error, false),
                }
            }
            BackupMutation::Create(BackupPayload::Account(body)) => {
                match self.remote.create_account(body).await {
                    Ok(server_id) => {
                        if let Err(error) = self.db.promote_account(id, server_id, body).await {
                            tracing::warn!(
                                "Account {id} reached the server as {server_id} but local promotion failed: {error}"
                            );
                        }
                        Replay::Synced
                    }
                    Err(error) => classify(&error, false),
                }
            }
            BackupMutation::Update(BackupPayload::Account(body)) => {
                if id < 0 {
                    return Replay::Failed(format!(
                        "account {id} has not been created on the server"
                    ));
                }
                match self.remote.update_account(id, body).await {
                    Ok(confirmed) => {
                        if let Err(error) = self
                            .db
                            .apply_confirmed_account(&operation.id, &confirmed)
                            .await
                        {
                            tracing::warn!("Failed to store confirmed account {id}: {error}");
                        }
                        Replay::Synced
                    }
                    Err(error) => classify(&error, true),
                }
            }
            BackupMutation::Delete => match self.remote.delete_account(id).await {
                Ok(()) => Replay::Synced,
                Err(error) if error.is_not_found() => Replay::Synced,
                Err(error) => classify(&error, false),
            },
        }
    }
}

/// Map a remote failure onto the pass policy.
///
/// For updates, not-found means the entity was deleted remotely and counts
/// as a conflict.
fn classify(error: &RemoteError, not_found_is_conflict: bool) -> Replay {
    let message = compact_text(&error.to_string());
    if error.is_conflict() || (not_found_is_conflict && error.is_not_found()) {
        Replay::Conflict(message)
    } else {
        Replay::Failed(message)
    }
}

fn describe(operation: &BackupOperation) -> String {
    format!(
        "{} {} {}",
        operation.kind(),
        operation.entity_type,
        operation.entity_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountUpdateBody, BankAccount, Direction, NewTransaction, Transaction};
    use crate::testing::FakeRemote;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Harness {
        db: DatabaseService,
        remote: Arc<FakeRemote>,
        orchestrator: SyncOrchestrator,
    }

    async fn harness() -> Harness {
        let db = DatabaseService::open_in_memory().await.unwrap();
        db.upsert_account(&BankAccount {
            id: 1,
            name: "Main".to_string(),
            balance: Decimal::ZERO,
            currency: "USD".to_string(),
        })
        .await
        .unwrap();
        let remote = Arc::new(FakeRemote::new());
        let orchestrator = SyncOrchestrator::new(
            db.clone(),
            remote.clone(),
            Arc::new(SyncStatusBroadcaster::new()),
        )
        .with_stuck_after_attempts(2);
        Harness {
            db,
            remote,
            orchestrator,
        }
    }

    fn draft(amount: Decimal) -> NewTransaction {
        NewTransaction {
            account_id: 1,
            category_id: 3,
            direction: Direction::Income,
            amount,
            transaction_date: Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap(),
            comment: None,
        }
    }

    fn server_row(id: i64) -> Transaction {
        Transaction {
            id,
            account_id: 1,
            category_id: 3,
            direction: Direction::Outcome,
            amount: dec!(5),
            transaction_date: Utc.with_ymd_and_hms(2025, 2, 2, 9, 0, 0).unwrap(),
            comment: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_log_leaves_status_alone() {
        let h = harness().await;
        let mut receiver = h.orchestrator.status().subscribe();

        let outcome = h.orchestrator.sync_all().await.unwrap();

        assert_eq!(outcome, SyncOutcome::default());
        assert!(!receiver.has_changed().unwrap());
        assert_eq!(h.orchestrator.status().status(), SyncStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_create_is_promoted_after_sync() {
        let h = harness().await;
        h.remote.set_next_id(42);
        let local = h.db.create_local_transaction(draft(dec!(100))).await.unwrap();
        assert_eq!(local.id, -1);

        let outcome = h.orchestrator.sync_all().await.unwrap();

        assert_eq!(outcome.synced.len(), 1);
        assert!(outcome.is_clean());
        assert!(h.db.get_transaction(-1).await.unwrap().is_none());
        let promoted = h.db.get_transaction(42).await.unwrap().unwrap();
        assert_eq!(promoted.amount, dec!(100));
        assert_eq!(promoted.direction, Direction::Income);
        assert_eq!(h.remote.transaction(42).unwrap().amount, dec!(100));
        assert_eq!(h.db.backup_count().await.unwrap(), 0);
        assert_eq!(h.orchestrator.status().status(), SyncStatus::Completed);
        assert_eq!(h.orchestrator.status().unsynced_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflict_halts_the_batch() {
        let h = harness().await;
        for id in [10, 11, 12] {
            h.remote.insert_transaction(server_row(id));
            let row = server_row(id);
            h.db.upsert_transaction(&row).await.unwrap();
            h.db.update_local_transaction(&row).await.unwrap();
        }
        h.remote.fail_call(
            "update_transaction:11",
            RemoteError::Conflict("modified elsewhere".into()),
        );

        let outcome = h.orchestrator.sync_all().await.unwrap();

        assert_eq!(outcome.synced.len(), 1);
        let conflict = outcome.conflict.clone().unwrap();
        assert_eq!(conflict.entity_id, 11);
        assert_eq!(conflict.entity_type, EntityType::Transaction);
        assert_eq!(outcome.remaining, 2);

        let pending: Vec<i64> = h
            .db
            .list_backup_operations()
            .await
            .unwrap()
            .iter()
            .map(|op| op.entity_id)
            .collect();
        assert_eq!(pending, vec![11, 12]);
        assert!(matches!(
            h.orchestrator.status().status(),
            SyncStatus::Conflict(_)
        ));
        assert_eq!(h.orchestrator.status().unsynced_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failure_does_not_block_other_entities() {
        let h = harness().await;
        h.db.create_local_transaction(draft(dec!(1))).await.unwrap();
        h.db.create_local_transaction(draft(dec!(2))).await.unwrap();
        h.remote.fail_next(
            "create_transaction",
            RemoteError::Transient("gateway timeout".into()),
        );

        let outcome = h.orchestrator.sync_all().await.unwrap();

        assert_eq!(outcome.synced.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.remaining, 1);
        assert_eq!(
            h.orchestrator.status().status(),
            SyncStatus::Failed(SyncError::UnsyncedOperations(1))
        );

        let left = h.db.list_backup_operations().await.unwrap();
        assert_eq!(left[0].entity_id, -1);
        assert_eq!(left[0].attempts, 1);
        assert!(left[0].last_error.as_deref().unwrap().contains("gateway timeout"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_failures_are_reported_as_stuck() {
        let h = harness().await;
        h.db.create_local_transaction(draft(dec!(1))).await.unwrap();
        for _ in 0..2 {
            h.remote
                .fail_next("create_transaction", RemoteError::Transient("down".into()));
        }

        let first = h.orchestrator.sync_all().await.unwrap();
        assert!(first.stuck.is_empty());
        let second = h.orchestrator.sync_all().await.unwrap();
        assert_eq!(second.stuck.len(), 1);
        assert_eq!(h.orchestrator.status().snapshot().stuck_count, 1);

        // Stuck operations are still retried
        let third = h.orchestrator.sync_all().await.unwrap();
        assert_eq!(third.synced.len(), 1);
        assert_eq!(h.orchestrator.status().snapshot().stuck_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_of_missing_server_row_counts_as_synced() {
        let h = harness().await;
        h.db.upsert_transaction(&server_row(77)).await.unwrap();
        h.db.delete_local_transaction(77).await.unwrap();

        let outcome = h.orchestrator.sync_all().await.unwrap();

        assert_eq!(outcome.synced.len(), 1);
        assert_eq!(h.db.backup_count().await.unwrap(), 0);
        assert_eq!(h.remote.calls(), vec!["delete_transaction:77".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_of_missing_server_row_is_a_conflict() {
        let h = harness().await;
        let row = server_row(55);
        h.db.upsert_transaction(&row).await.unwrap();
        h.db.update_local_transaction(&row).await.unwrap();

        let outcome = h.orchestrator.sync_all().await.unwrap();

        assert!(outcome.synced.is_empty());
        assert_eq!(outcome.conflict.map(|c| c.entity_id), Some(55));
        assert_eq!(h.db.backup_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn account_update_is_replayed() {
        let h = harness().await;
        let remote_account = BankAccount {
            id: 1,
            name: "Main".to_string(),
            balance: Decimal::ZERO,
            currency: "USD".to_string(),
        };
        h.remote.insert_account(remote_account.clone());

        let renamed = BankAccount {
            name: "Everyday".to_string(),
            ..remote_account
        };
        h.db.update_local_account(&renamed).await.unwrap();

        let outcome = h.orchestrator.sync_all().await.unwrap();

        assert!(outcome.is_clean());
        assert_eq!(
            h.db.get_account(1).await.unwrap().unwrap().name,
            "Everyday".to_string()
        );
        assert_eq!(h.remote.calls(), vec!["update_account:1".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_account_create_is_promoted() {
        let h = harness().await;
        let local = BankAccount {
            id: -3,
            name: "Savings".to_string(),
            balance: dec!(12),
            currency: "USD".to_string(),
        };
        h.db.upsert_account(&local).await.unwrap();
        h.db.append_backup(BackupOperation::new(
            -3,
            EntityType::Account,
            BackupMutation::Create(BackupPayload::Account(AccountUpdateBody {
                name: "Savings".to_string(),
                balance: "12".to_string(),
                currency: "USD".to_string(),
            })),
        ))
        .await
        .unwrap();
        h.remote.set_next_id(8);

        h.orchestrator.sync_all().await.unwrap();

        assert!(h.db.get_account(-3).await.unwrap().is_none());
        assert_eq!(h.db.get_account(8).await.unwrap().unwrap().balance, dec!(12));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_deleted_during_replay_queues_server_delete() {
        let h = harness().await;
        let local = h.db.create_local_transaction(draft(dec!(9))).await.unwrap();
        let body = local.to_request_body();
        // Row removed without touching the log, as if deleted mid-flight
        h.db.remove_synced_transaction(-1).await.unwrap();
        h.db.append_backup(BackupOperation::create_transaction(-1, body.clone()))
            .await
            .unwrap();

        let promoted = h.db.promote_transaction(-1, 60, &body).await.unwrap();

        assert!(promoted.is_none());
        let pending = h.db.list_backup_operations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, 60);
        assert_eq!(pending[0].kind(), crate::models::OperationKind::Delete);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn promotion_carries_an_edit_made_while_the_create_was_in_flight() {
        let h = harness().await;
        let local = h.db.create_local_transaction(draft(dec!(100))).await.unwrap();
        let replayed = local.to_request_body();
        let edited = Transaction {
            amount: dec!(120),
            comment: Some("corrected".to_string()),
            ..local
        };
        h.db.update_local_transaction(&edited).await.unwrap();

        let promoted = h
            .db
            .promote_transaction(-1, 60, &replayed)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(promoted.id, 60);
        assert_eq!(promoted.amount, dec!(120));
        assert_eq!(promoted.comment.as_deref(), Some("corrected"));
        assert!(h.db.get_transaction(-1).await.unwrap().is_none());
        let pending = h.db.list_backup_operations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, 60);
        assert_eq!(
            pending[0].mutation,
            BackupMutation::Update(BackupPayload::Transaction(edited.to_request_body()))
        );
        assert_eq!(
            h.db.get_account(1).await.unwrap().unwrap().balance,
            dec!(120)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn confirmed_transaction_yields_to_a_newer_queued_edit() {
        let h = harness().await;
        let row = server_row(20);
        h.db.upsert_transaction(&row).await.unwrap();
        let newer = Transaction {
            comment: Some("newer".to_string()),
            ..row.clone()
        };
        h.db.update_local_transaction(&newer).await.unwrap();

        let stored = h
            .db
            .apply_confirmed_transaction(&BackupOperationId::new(), &row)
            .await
            .unwrap();

        assert!(!stored);
        assert_eq!(
            h.db.get_transaction(20).await.unwrap().unwrap().comment.as_deref(),
            Some("newer")
        );
        assert_eq!(h.db.backup_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn confirmed_account_yields_to_a_newer_queued_edit() {
        let h = harness().await;
        let confirmed = BankAccount {
            id: 1,
            name: "Main".to_string(),
            balance: dec!(40),
            currency: "USD".to_string(),
        };
        h.db.update_local_account(&BankAccount {
            name: "Everyday".to_string(),
            ..confirmed.clone()
        })
        .await
        .unwrap();

        let stored = h
            .db
            .apply_confirmed_account(&BackupOperationId::new(), &confirmed)
            .await
            .unwrap();

        assert!(!stored);
        assert_eq!(h.db.get_account(1).await.unwrap().unwrap().name, "Everyday");
        assert_eq!(h.db.backup_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transactions_follow_a_promoted_account_within_one_pass() {
        let h = harness().await;
        let account = h
            .db
            .create_local_account(&BankAccount {
                id: 0,
                name: "Savings".to_string(),
                balance: Decimal::ZERO,
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        let queued = h
            .db
            .create_local_transaction(NewTransaction {
                account_id: account.id,
                ..draft(dec!(15))
            })
            .await
            .unwrap();
        h.remote.set_next_id(8);

        let outcome = h.orchestrator.sync_all().await.unwrap();

        assert_eq!(outcome.synced.len(), 2);
        assert!(outcome.is_clean());
        assert!(h.db.get_transaction(queued.id).await.unwrap().is_none());
        assert_eq!(h.db.get_transaction(9).await.unwrap().unwrap().account_id, 8);
        assert_eq!(h.remote.transaction(9).unwrap().account_id, 8);
        assert_eq!(h.db.get_account(8).await.unwrap().unwrap().balance, dec!(15));
    }
}
