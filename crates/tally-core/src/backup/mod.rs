//! Durable, compacting log of pending mutations.
//!
//! Every append runs compaction for the target entity, so at rest the log
//! holds at most one operation per (entity id, entity type). Callers that
//! need the append to be atomic with other writes pass a transaction as the
//! connection.

mod compaction;

pub use compaction::reduce;

use std::collections::HashSet;

use libsql::Connection;

use crate::db::{BackupRepository, LibSqlBackupRepository};
use crate::error::Result;
use crate::models::{BackupOperation, BackupOperationId, EntityType, OperationKind};

/// Compacting view over the `backup_operations` table
pub struct BackupLog<'a> {
    repo: LibSqlBackupRepository<'a>,
}

impl<'a> BackupLog<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            repo: LibSqlBackupRepository::new(conn),
        }
    }

    /// Append an operation and compact its entity's chain.
    ///
    /// Returns the operation left pending for the entity, if any. A chain
    /// with no defined reduction is rejected and the log is left unchanged.
    pub async fn append(&self, operation: BackupOperation) -> Result<Option<BackupOperation>> {
        let mut chain = self
            .repo
            .list_for_entity(operation.entity_id, operation.entity_type)
            .await?;

        if chain.is_empty() && !is_local_delete(&operation) {
            self.repo.insert(&operation).await?;
            return Ok(Some(operation));
        }

        let entity_id = operation.entity_id;
        let entity_type = operation.entity_type;
        chain.push(operation);

        let reduced = match reduce(&chain) {
            Ok(reduced) => reduced,
            Err(error) => {
                tracing::warn!(
                    "Rejected backup operation for {} {}: {}",
                    entity_type,
                    entity_id,
                    error
                );
                return Err(error);
            }
        };

        self.replace_chain(entity_id, entity_type, reduced.as_ref())
            .await?;
        tracing::debug!(
            "Compacted {} pending operation(s) for {} {} into {}",
            chain.len(),
            entity_type,
            entity_id,
            reduced
                .as_ref()
                .map_or("nothing", |op| op.kind().as_str())
        );
        Ok(reduced)
    }

    /// Re-run compaction over what is stored for one entity.
    pub async fn compact(
        &self,
        entity_id: i64,
        entity_type: EntityType,
    ) -> Result<Option<BackupOperation>> {
        let chain = self.repo.list_for_entity(entity_id, entity_type).await?;
        if chain.len() <= 1 && chain.iter().all(|op| !is_local_delete(op)) {
            return Ok(chain.into_iter().next());
        }

        let reduced = reduce(&chain)?;
        self.replace_chain(entity_id, entity_type, reduced.as_ref())
            .await?;
        Ok(reduced)
    }

    async fn replace_chain(
        &self,
        entity_id: i64,
        entity_type: EntityType,
        reduced: Option<&BackupOperation>,
    ) -> Result<()> {
        self.repo.remove_all(entity_id, entity_type).await?;
        if let Some(operation) = reduced {
            self.repo.insert(operation).await?;
        }
        Ok(())
    }

    /// All pending operations ordered by timestamp
    pub async fn list(&self) -> Result<Vec<BackupOperation>> {
        self.repo.list().await
    }

    pub async fn list_for_entity(
        &self,
        entity_id: i64,
        entity_type: EntityType,
    ) -> Result<Vec<BackupOperation>> {
        self.repo.list_for_entity(entity_id, entity_type).await
    }

    pub async fn get(&self, id: &BackupOperationId) -> Result<Option<BackupOperation>> {
        self.repo.get(id).await
    }

    pub async fn has_pending(&self, entity_id: i64, entity_type: EntityType) -> Result<bool> {
        Ok(!self
            .repo
            .list_for_entity(entity_id, entity_type)
            .await?
            .is_empty())
    }

    /// Ids of entities whose pending operation is one of `kinds`
    pub async fn pending_entity_ids(
        &self,
        entity_type: EntityType,
        kinds: &[OperationKind],
    ) -> Result<HashSet<i64>> {
        self.repo.pending_entity_ids(entity_type, kinds).await
    }

    pub async fn remove(&self, id: &BackupOperationId) -> Result<bool> {
        self.repo.remove(id).await
    }

    /// Overwrite a stored operation, keeping its id, timestamp and attempts.
    pub async fn rewrite(&self, operation: &BackupOperation) -> Result<()> {
        self.repo.remove(&operation.id).await?;
        self.repo.insert(operation).await
    }

    pub async fn remove_all(&self, entity_id: i64, entity_type: EntityType) -> Result<u64> {
        self.repo.remove_all(entity_id, entity_type).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.repo.clear().await
    }

    pub async fn count(&self) -> Result<usize> {
        self.repo.count().await
    }

    pub async fn count_for_type(&self, entity_type: EntityType) -> Result<usize> {
        self.repo.count_for_type(entity_type).await
    }

    pub async fn record_failure(&self, id: &BackupOperationId, message: &str) -> Result<()> {
        self.repo.record_failure(id, message).await
    }
}

// A delete of an entity the server never saw has nothing to replay
const fn is_local_delete(operation: &BackupOperation) -> bool {
    operation.entity_id < 0 && matches!(operation.kind(), OperationKind::Delete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::Error;
    use crate::models::{BackupMutation, BackupPayload, TransactionRequestBody};
    use pretty_assertions::assert_eq;

    fn body(amount: &str) -> TransactionRequestBody {
        TransactionRequestBody {
            account_id: 1,
            category_id: 1,
            amount: amount.to_string(),
            transaction_date: "2025-02-02T10:00:00.000Z".to_string(),
            comment: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn append_keeps_at_most_one_operation_per_entity() {
        let db = Database::open_in_memory().await.unwrap();
        let log = BackupLog::new(db.connection());

        log.append(BackupOperation::create_transaction(-1, body("1")).with_timestamp(1))
            .await
            .unwrap();
        for (at, amount) in [(2, "2"), (3, "3"), (4, "4")] {
            log.append(BackupOperation::update_transaction(-1, body(amount)).with_timestamp(at))
                .await
                .unwrap();
            assert_eq!(
                log.list_for_entity(-1, EntityType::Transaction)
                    .await
                    .unwrap()
                    .len(),
                1
            );
        }

        let pending = log.list().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].mutation,
            BackupMutation::Create(BackupPayload::Transaction(body("4")))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleting_a_local_entity_leaves_nothing() {
        let db = Database::open_in_memory().await.unwrap();
        let log = BackupLog::new(db.connection());

        log.append(BackupOperation::create_transaction(-5, body("1")))
            .await
            .unwrap();
        log.append(BackupOperation::update_transaction(-5, body("2")))
            .await
            .unwrap();
        let left = log
            .append(BackupOperation::delete_transaction(-5))
            .await
            .unwrap();

        assert_eq!(left, None);
        assert_eq!(log.count().await.unwrap(), 0);

        // A bare delete of a local id is dropped as well
        log.append(BackupOperation::delete_transaction(-6))
            .await
            .unwrap();
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_delete_stays_queued() {
        let db = Database::open_in_memory().await.unwrap();
        let log = BackupLog::new(db.connection());

        log.append(BackupOperation::update_transaction(12, body("2")))
            .await
            .unwrap();
        let left = log
            .append(BackupOperation::delete_transaction(12))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(left.kind(), OperationKind::Delete);
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_chain_is_rejected_without_changes() {
        let db = Database::open_in_memory().await.unwrap();
        let log = BackupLog::new(db.connection());

        let existing = BackupOperation::update_transaction(3, body("1")).with_timestamp(1);
        log.append(existing.clone()).await.unwrap();

        let result = log
            .append(BackupOperation::create_transaction(3, body("2")).with_timestamp(2))
            .await;
        assert!(matches!(result, Err(Error::InvalidOperationChain { .. })));
        assert_eq!(log.list().await.unwrap(), vec![existing]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn entities_are_compacted_independently() {
        let db = Database::open_in_memory().await.unwrap();
        let log = BackupLog::new(db.connection());

        log.append(BackupOperation::update_transaction(1, body("1")))
            .await
            .unwrap();
        log.append(BackupOperation::update_transaction(2, body("1")))
            .await
            .unwrap();
        log.append(BackupOperation::update_transaction(1, body("9")))
            .await
            .unwrap();

        assert_eq!(log.count().await.unwrap(), 2);
        assert!(log.has_pending(2, EntityType::Transaction).await.unwrap());
        assert!(!log.has_pending(2, EntityType::Account).await.unwrap());
    }
}
