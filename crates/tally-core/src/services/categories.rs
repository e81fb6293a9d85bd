//! Category lookup with offline fallback.

use super::ServiceContext;
use crate::error::Result;
use crate::models::{Category, Direction};
use crate::network::ExecutionPath;

pub struct CategoriesService {
    context: ServiceContext,
}

impl CategoriesService {
    pub(crate) const fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// All categories, refreshed from the server when reachable.
    pub async fn fetch_categories(&self) -> Result<Vec<Category>> {
        let ctx = &self.context;
        let (mut categories, path) = ctx
            .executor
            .execute_traced(
                "fetch categories",
                || ctx.remote.fetch_categories(),
                || ctx.db.list_categories(),
            )
            .await?;

        if path == ExecutionPath::Remote {
            ctx.db.upsert_categories(&categories).await?;
        }
        categories.sort_by_key(|category| category.id);
        Ok(categories)
    }

    pub async fn by_direction(&self, direction: Direction) -> Result<Vec<Category>> {
        let mut categories = self.fetch_categories().await?;
        categories.retain(|category| category.direction == direction);
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::test_engine;

    fn category(id: i64, name: &str, direction: Direction) -> Category {
        Category {
            id,
            name: name.to_string(),
            emoji: "🏷️".to_string(),
            direction,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetched_categories_are_cached_for_offline_use() {
        let t = test_engine(true).await;
        t.remote
            .insert_category(category(3, "Food", Direction::Outcome));
        t.remote
            .insert_category(category(1, "Salary", Direction::Income));

        let online = t.engine.categories().fetch_categories().await.unwrap();
        assert_eq!(online.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);

        t.connectivity.set_connected(false);
        let income = t
            .engine
            .categories()
            .by_direction(Direction::Income)
            .await
            .unwrap();
        assert_eq!(income.len(), 1);
        assert_eq!(income[0].name, "Salary");
    }
}
