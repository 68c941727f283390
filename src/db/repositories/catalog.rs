//! Catalog repository
//!
//! Read access to the seeded course categories and levels.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CategoryLevelStat, CategoryStat, CourseCategory, CourseLevel, IdSelector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use super::push_id_in;

const CATEGORY_STATS_SQL: &str = r#"
    SELECT cc.title AS title, COUNT(j.course_id) AS courses_count
    FROM course_categories cc
    LEFT JOIN course_categories_junction j ON j.category_id = cc.id
    GROUP BY cc.id, cc.title
    ORDER BY cc.id
"#;

// Categories without courses yield one row with a NULL level.
const CATEGORY_LEVEL_STATS_SQL: &str = r#"
    SELECT cc.title AS category_title, cl.title AS level_title, COUNT(c.id) AS courses_count
    FROM course_categories cc
    LEFT JOIN course_categories_junction j ON j.category_id = cc.id
    LEFT JOIN courses c ON c.id = j.course_id
    LEFT JOIN course_levels cl ON cl.id = c.level_id
    GROUP BY cc.id, cc.title, cl.id, cl.title
    ORDER BY cc.id, cl.id
"#;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// List categories, by id unless `order_by_title` is set
    async fn list_categories(
        &self,
        ids: &IdSelector,
        order_by_title: bool,
    ) -> Result<Vec<CourseCategory>>;

    /// List levels ordered by id
    async fn list_levels(&self, ids: &IdSelector) -> Result<Vec<CourseLevel>>;

    /// Number of courses attached to each category
    async fn category_stats(&self) -> Result<Vec<CategoryStat>>;

    /// Number of courses per (category, level) pair
    async fn category_level_stats(&self) -> Result<Vec<CategoryLevelStat>>;
}

pub struct SqlxCatalogRepository {
    pool: DynDatabasePool,
}

impl SqlxCatalogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CatalogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CatalogRepository for SqlxCatalogRepository {
    async fn list_categories(
        &self,
        ids: &IdSelector,
        order_by_title: bool,
    ) -> Result<Vec<CourseCategory>> {
        let order = if order_by_title { "title" } else { "id" };
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_titled_sqlite(self.pool.sqlite()?, "course_categories", ids, order).await?
            }
            DatabaseDriver::Mysql => {
                list_titled_mysql(self.pool.mysql()?, "course_categories", ids, order).await?
            }
        };
        Ok(rows
            .into_iter()
            .map(|(id, title)| CourseCategory { id, title })
            .collect())
    }

    async fn list_levels(&self, ids: &IdSelector) -> Result<Vec<CourseLevel>> {
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_titled_sqlite(self.pool.sqlite()?, "course_levels", ids, "id").await?
            }
            DatabaseDriver::Mysql => {
                list_titled_mysql(self.pool.mysql()?, "course_levels", ids, "id").await?
            }
        };
        Ok(rows
            .into_iter()
            .map(|(id, title)| CourseLevel { id, title })
            .collect())
    }

    async fn category_stats(&self) -> Result<Vec<CategoryStat>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(CATEGORY_STATS_SQL)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to compute category stats")?;
                rows.iter()
                    .map(|row| -> Result<CategoryStat> {
                        Ok(CategoryStat {
                            title: row.try_get("title")?,
                            courses_count: row.try_get("courses_count")?,
                        })
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(CATEGORY_STATS_SQL)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to compute category stats")?;
                rows.iter()
                    .map(|row| -> Result<CategoryStat> {
                        Ok(CategoryStat {
                            title: row.try_get("title")?,
                            courses_count: row.try_get("courses_count")?,
                        })
                    })
                    .collect()
            }
        }
    }

    async fn category_level_stats(&self) -> Result<Vec<CategoryLevelStat>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(CATEGORY_LEVEL_STATS_SQL)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to compute category level stats")?;
                rows.iter()
                    .map(|row| -> Result<CategoryLevelStat> {
                        Ok(CategoryLevelStat {
                            category_title: row.try_get("category_title")?,
                            level_title: row.try_get("level_title")?,
                            courses_count: row.try_get("courses_count")?,
                        })
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(CATEGORY_LEVEL_STATS_SQL)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to compute category level stats")?;
                rows.iter()
                    .map(|row| -> Result<CategoryLevelStat> {
                        Ok(CategoryLevelStat {
                            category_title: row.try_get("category_title")?,
                            level_title: row.try_get("level_title")?,
                            courses_count: row.try_get("courses_count")?,
                        })
                    })
                    .collect()
            }
        }
    }
}

// `table` and `order` are always compile-time constants from this module.
async fn list_titled_sqlite(
    pool: &SqlitePool,
    table: &str,
    ids: &IdSelector,
    order: &str,
) -> Result<Vec<(i64, String)>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT id, title FROM {table}"));
    if let Some(ids) = ids.ids() {
        qb.push(" WHERE ");
        push_id_in(&mut qb, "id", ids);
    }
    qb.push(format!(" ORDER BY {order}"));

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list {}", table))?;

    rows.iter()
        .map(|row| -> Result<(i64, String)> { Ok((row.try_get("id")?, row.try_get("title")?)) })
        .collect()
}

async fn list_titled_mysql(
    pool: &MySqlPool,
    table: &str,
    ids: &IdSelector,
    order: &str,
) -> Result<Vec<(i64, String)>> {
    let mut qb = QueryBuilder::<MySql>::new(format!("SELECT id, title FROM {table}"));
    if let Some(ids) = ids.ids() {
        qb.push(" WHERE ");
        push_id_in(&mut qb, "id", ids);
    }
    qb.push(format!(" ORDER BY {order}"));

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list {}", table))?;

    rows.iter()
        .map(|row| -> Result<(i64, String)> { Ok((row.try_get("id")?, row.try_get("title")?)) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, migrated_pool};
    use crate::db::repositories::{CourseRepository, SqlxCourseRepository};
    use crate::models::{CreateCourseInput, UserType};

    #[tokio::test]
    async fn test_seeded_categories() {
        let repo = SqlxCatalogRepository::new(migrated_pool().await);

        let by_id = repo.list_categories(&IdSelector::All, false).await.unwrap();
        let titles: Vec<_> = by_id.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Go", "C++", "C#", "Rust", "Ruby", "Python"]);

        let by_title = repo.list_categories(&IdSelector::All, true).await.unwrap();
        assert_eq!(by_title.first().unwrap().title, "C#");
    }

    #[tokio::test]
    async fn test_levels_by_id() {
        let repo = SqlxCatalogRepository::new(migrated_pool().await);

        let levels = repo.list_levels(&IdSelector::Ids(vec![3, 1])).await.unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].title, "Beginner");
        assert_eq!(levels[1].title, "Advanced");

        let none = repo.list_levels(&IdSelector::Ids(vec![42])).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_category_stats_counts_zero() {
        let repo = SqlxCatalogRepository::new(migrated_pool().await);
        let stats = repo.category_stats().await.unwrap();
        assert_eq!(stats.len(), 6);
        assert!(stats.iter().all(|s| s.courses_count == 0));
    }

    #[tokio::test]
    async fn test_category_level_stats_groups_by_level() {
        let pool = migrated_pool().await;
        let instructor = insert_user(&pool, UserType::Educator).await;
        let courses = SqlxCourseRepository::new(pool.clone());
        for level_id in [1, 1, 2] {
            courses
                .create(&CreateCourseInput {
                    title: format!("Level {}", level_id),
                    level_id,
                    has_certificate: false,
                    category_ids: vec![1],
                    thumbnail: String::new(),
                    instructor_id: instructor,
                })
                .await
                .unwrap();
        }

        let stats = SqlxCatalogRepository::new(pool)
            .category_level_stats()
            .await
            .unwrap();

        let go: Vec<_> = stats.iter().filter(|s| s.category_title == "Go").collect();
        assert_eq!(go.len(), 2);
        assert_eq!(go[0].level_title.as_deref(), Some("Beginner"));
        assert_eq!(go[0].courses_count, 2);
        assert_eq!(go[1].courses_count, 1);

        let rust = stats.iter().find(|s| s.category_title == "Rust").unwrap();
        assert_eq!(rust.level_title, None);
        assert_eq!(rust.courses_count, 0);
    }
}
