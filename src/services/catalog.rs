//! Catalog service: course categories and levels.

use crate::db::repositories::CatalogRepository;
use crate::models::{CategoryLevelStat, CategoryStat, CourseCategory, CourseLevel, IdSelector};
use crate::services::course::CourseServiceError;
use anyhow::Context;
use std::sync::Arc;

pub struct CatalogService {
    catalog: Arc<dyn CatalogRepository>,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// List categories. `sort` may be `id` (default) or `title`.
    pub async fn categories(
        &self,
        ids: &IdSelector,
        sort: Option<&str>,
    ) -> Result<Vec<CourseCategory>, CourseServiceError> {
        let by_title = match sort.map(str::trim) {
            None | Some("") | Some("id") => false,
            Some("title") | Some("name") => true,
            Some(other) => {
                return Err(CourseServiceError::ValidationError(format!(
                    "Unknown sort field '{}'",
                    other
                )))
            }
        };
        let categories = self
            .catalog
            .list_categories(ids, by_title)
            .await
            .context("Failed to list categories")?;
        Ok(categories)
    }

    pub async fn levels(&self, ids: &IdSelector) -> Result<Vec<CourseLevel>, CourseServiceError> {
        let levels = self
            .catalog
            .list_levels(ids)
            .await
            .context("Failed to list levels")?;
        Ok(levels)
    }

    pub async fn category_stats(&self) -> Result<Vec<CategoryStat>, CourseServiceError> {
        let stats = self
            .catalog
            .category_stats()
            .await
            .context("Failed to compute category stats")?;
        Ok(stats)
    }

    pub async fn category_level_stats(&self) -> Result<Vec<CategoryLevelStat>, CourseServiceError> {
        let stats = self
            .catalog
            .category_level_stats()
            .await
            .context("Failed to compute category level stats")?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::SqlxCatalogRepository;

    #[tokio::test]
    async fn test_sort_parameter() {
        let service = CatalogService::new(SqlxCatalogRepository::boxed(migrated_pool().await));

        let by_id = service.categories(&IdSelector::All, None).await.unwrap();
        assert_eq!(by_id[0].title, "Go");

        let by_title = service.categories(&IdSelector::All, Some("title")).await.unwrap();
        assert_eq!(by_title[0].title, "C#");

        let bad = service.categories(&IdSelector::All, Some("price")).await;
        assert!(matches!(bad, Err(CourseServiceError::ValidationError(_))));
    }
}
