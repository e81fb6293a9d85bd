//! Category repository implementation

use std::str::FromStr;

use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{Category, Direction};

/// Trait for category storage operations (async)
#[allow(async_fn_in_trait)]
pub trait CategoryRepository {
    async fn get(&self, id: i64) -> Result<Option<Category>>;

    async fn list(&self) -> Result<Vec<Category>>;

    async fn upsert(&self, category: &Category) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `CategoryRepository`
pub struct LibSqlCategoryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCategoryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_category(row: &Row) -> Result<Category> {
        let direction: String = row.get(3)?;
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            emoji: row.get(2)?,
            direction: Direction::from_str(&direction)?,
        })
    }
}

impl CategoryRepository for LibSqlCategoryRepository<'_> {
    async fn get(&self, id: i64) -> Result<Option<Category>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, emoji, direction FROM categories WHERE id = ?",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_category(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, emoji, direction FROM categories ORDER BY id",
                (),
            )
            .await?;

        let mut categories = Vec::new();
        while let Some(row) = rows.next().await? {
            categories.push(Self::parse_category(&row)?);
        }
        Ok(categories)
    }

    async fn upsert(&self, category: &Category) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO categories (id, name, emoji, direction) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    emoji = excluded.emoji,
                    direction = excluded.direction",
                params![
                    category.id,
                    category.name.clone(),
                    category.emoji.clone(),
                    category.direction.as_str(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM categories", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_and_list() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlCategoryRepository::new(db.connection());

        repo.upsert(&Category {
            id: 2,
            name: "Salary".to_string(),
            emoji: "💰".to_string(),
            direction: Direction::Income,
        })
        .await
        .unwrap();
        repo.upsert(&Category {
            id: 1,
            name: "Groceries".to_string(),
            emoji: "🛒".to_string(),
            direction: Direction::Outcome,
        })
        .await
        .unwrap();

        let categories = repo.list().await.unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name, "Groceries");
        assert!(repo.get(2).await.unwrap().unwrap().is_income());
    }
}
