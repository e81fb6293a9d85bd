//! Engine metadata repository (key/value)

use libsql::Connection;

use crate::error::{Error, Result};

const NEXT_LOCAL_ID_KEY: &str = "next_local_id";

/// Trait for engine metadata storage operations (async)
#[allow(async_fn_in_trait)]
pub trait MetaRepository {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Mint the next locally-assigned id.
    ///
    /// Ids are negative, strictly decreasing, and never reused, even after
    /// the rows that carried them are deleted.
    async fn next_local_id(&self, lowest_existing: Option<i64>) -> Result<i64>;
}

/// libSQL implementation of `MetaRepository`
pub struct LibSqlMetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMetaRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl MetaRepository for LibSqlMetaRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_meta WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn next_local_id(&self, lowest_existing: Option<i64>) -> Result<i64> {
        let stored = match self.get(NEXT_LOCAL_ID_KEY).await? {
            Some(value) => value.parse::<i64>().map_err(|error| {
                Error::Database(format!("corrupt {NEXT_LOCAL_ID_KEY} value '{value}': {error}"))
            })?,
            None => -1,
        };

        // Stay below any local id already present, e.g. rows restored from elsewhere
        let floor = lowest_existing.filter(|id| *id < 0).map_or(-1, |id| id - 1);
        let id = stored.min(floor);

        self.set(NEXT_LOCAL_ID_KEY, &(id - 1).to_string()).await?;
        Ok(id)
    }
}
