//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
pub async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: entity tables
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Balance is decimal text so arithmetic stays exact
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            balance TEXT NOT NULL,
            currency TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            emoji TEXT NOT NULL,
            direction TEXT NOT NULL CHECK (direction IN ('income', 'outcome'))
        )",
        // Negative ids are locally minted and not yet known to the server
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            direction TEXT NOT NULL CHECK (direction IN ('income', 'outcome')),
            amount TEXT NOT NULL,
            transaction_date INTEGER NOT NULL,
            comment TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_transactions_account_date
            ON transactions(account_id, transaction_date DESC)",
    ];

    apply(conn, 1, &statements).await
}

/// Migration to version 2: backup log and engine metadata
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        // seq breaks timestamp ties in insertion order
        "CREATE TABLE IF NOT EXISTS backup_operations (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            entity_id INTEGER NOT NULL,
            entity_type TEXT NOT NULL CHECK (entity_type IN ('transaction', 'account')),
            operation_type TEXT NOT NULL CHECK (operation_type IN ('create', 'update', 'delete')),
            payload TEXT,
            timestamp INTEGER NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_backup_operations_entity
            ON backup_operations(entity_type, entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_backup_operations_order
            ON backup_operations(timestamp, seq)",
        "CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    ];

    apply(conn, 2, &statements).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn fresh_database_is_at_current_version() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(
            get_version(db.connection()).await.unwrap(),
            CURRENT_VERSION
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn running_twice_is_a_no_op() {
        let db = Database::open_in_memory().await.unwrap();
        run(db.connection()).await.unwrap();

        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM schema_version", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), i64::from(CURRENT_VERSION));
    }
}
