//! Backup operation repository implementation

use std::collections::HashSet;
use std::str::FromStr;

use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{
    BackupMutation, BackupOperation, BackupOperationId, BackupPayload, EntityType, OperationKind,
};

const COLUMNS: &str =
    "id, entity_id, entity_type, operation_type, payload, timestamp, attempts, last_error";

/// Trait for raw backup operation storage (async)
///
/// This is row-level access only; compaction lives in [`crate::backup`].
#[allow(async_fn_in_trait)]
pub trait BackupRepository {
    async fn insert(&self, operation: &BackupOperation) -> Result<()>;

    async fn get(&self, id: &BackupOperationId) -> Result<Option<BackupOperation>>;

    /// All operations in replay order
    async fn list(&self) -> Result<Vec<BackupOperation>>;

    /// Operations for one entity in replay order
    async fn list_for_entity(
        &self,
        entity_id: i64,
        entity_type: EntityType,
    ) -> Result<Vec<BackupOperation>>;

    /// Entity ids of the given type with a pending operation of one of `kinds`
    async fn pending_entity_ids(
        &self,
        entity_type: EntityType,
        kinds: &[OperationKind],
    ) -> Result<HashSet<i64>>;

    async fn remove(&self, id: &BackupOperationId) -> Result<bool>;

    async fn remove_all(&self, entity_id: i64, entity_type: EntityType) -> Result<u64>;

    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    async fn count_for_type(&self, entity_type: EntityType) -> Result<usize>;

    /// Bump the attempt counter and remember the failure message
    async fn record_failure(&self, id: &BackupOperationId, message: &str) -> Result<()>;
}

/// libSQL implementation of `BackupRepository`
pub struct LibSqlBackupRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlBackupRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_operation(row: &Row) -> Result<BackupOperation> {
        let id: String = row.get(0)?;
        let entity_type: String = row.get(2)?;
        let operation_type: String = row.get(3)?;
        let payload: Option<String> = row.get(4)?;
        let attempts: i64 = row.get(6)?;

        let kind = OperationKind::from_str(&operation_type)?;
        let payload = payload
            .map(|raw| serde_json::from_str::<BackupPayload>(&raw))
            .transpose()?;
        let mutation = match (kind, payload) {
            (OperationKind::Create, Some(payload)) => BackupMutation::Create(payload),
            (OperationKind::Update, Some(payload)) => BackupMutation::Update(payload),
            (OperationKind::Delete, _) => BackupMutation::Delete,
            (kind, None) => {
                return Err(Error::Database(format!(
                    "backup operation {id} ({kind}) has no payload"
                )))
            }
        };

        Ok(BackupOperation {
            id: id
                .parse()
                .map_err(|error| Error::Database(format!("invalid backup id '{id}': {error}")))?,
            entity_id: row.get(1)?,
            entity_type: EntityType::from_str(&entity_type)?,
            mutation,
            timestamp: row.get(5)?,
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            last_error: row.get(7)?,
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<BackupOperation>> {
        let mut operations = Vec::new();
        while let Some(row) = rows.next().await? {
            operations.push(Self::parse_operation(&row)?);
        }
        Ok(operations)
    }

    async fn count_where(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<usize> {
        let mut rows = self.conn.query(sql, params).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl BackupRepository for LibSqlBackupRepository<'_> {
    async fn insert(&self, operation: &BackupOperation) -> Result<()> {
        let payload = operation
            .mutation
            .payload()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO backup_operations
                    (id, entity_id, entity_type, operation_type, payload, timestamp, attempts, last_error)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    operation.id.as_str(),
                    operation.entity_id,
                    operation.entity_type.as_str(),
                    operation.kind().as_str(),
                    payload,
                    operation.timestamp,
                    i64::from(operation.attempts),
                    operation.last_error.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &BackupOperationId) -> Result<Option<BackupOperation>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {COLUMNS} FROM backup_operations WHERE id = ?"),
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_operation(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<BackupOperation>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {COLUMNS} FROM backup_operations ORDER BY timestamp, seq"),
                (),
            )
            .await?;
        Self::collect(rows).await
    }

    async fn list_for_entity(
        &self,
        entity_id: i64,
        entity_type: EntityType,
    ) -> Result<Vec<BackupOperation>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM backup_operations
                     WHERE entity_id = ? AND entity_type = ?
                     ORDER BY timestamp, seq"
                ),
                params![entity_id, entity_type.as_str()],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn pending_entity_ids(
        &self,
        entity_type: EntityType,
        kinds: &[OperationKind],
    ) -> Result<HashSet<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT entity_id, operation_type FROM backup_operations WHERE entity_type = ?",
                [entity_type.as_str()],
            )
            .await?;

        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await? {
            let operation_type: String = row.get(1)?;
            if kinds.contains(&OperationKind::from_str(&operation_type)?) {
                ids.insert(row.get::<i64>(0)?);
            }
        }
        Ok(ids)
    }

    async fn remove(&self, id: &BackupOperationId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM backup_operations WHERE id = ?", [id.as_str()])
            .await?;
        Ok(affected > 0)
    }

    async fn remove_all(&self, entity_id: i64, entity_type: EntityType) -> Result<u64> {
        Ok(self
            .conn
            .execute(
                "DELETE FROM backup_operations WHERE entity_id = ? AND entity_type = ?",
                params![entity_id, entity_type.as_str()],
            )
            .await?)
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM backup_operations", ()).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        self.count_where("SELECT COUNT(*) FROM backup_operations", ())
            .await
    }

    async fn count_for_type(&self, entity_type: EntityType) -> Result<usize> {
        self.count_where(
            "SELECT COUNT(*) FROM backup_operations WHERE entity_type = ?",
            [entity_type.as_str()],
        )
        .await
    }

    async fn record_failure(&self, id: &BackupOperationId, message: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE backup_operations SET attempts = attempts + 1, last_error = ? WHERE id = ?",
                params![message, id.as_str()],
            )
            .await?;
        Ok(())
    }
}
