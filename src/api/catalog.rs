//! Catalog API endpoints: course categories and levels

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::id_selector;
use crate::api::middleware::{ApiError, AppState};
use crate::models::{CategoryLevelStat, CategoryStat, CourseCategory, CourseLevel};

#[derive(Debug, Deserialize)]
pub struct ListCategoriesQuery {
    pub id: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListLevelsQuery {
    pub id: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/course-categories", get(list_categories))
        .route("/course-categories/stats", get(category_stats))
        .route("/course-categories/levels-stats", get(category_level_stats))
        .route("/course-levels", get(list_levels))
}

/// GET /api/v1/course-categories?id=all&sort=title
async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<ListCategoriesQuery>,
) -> Result<Json<Vec<CourseCategory>>, ApiError> {
    let ids = id_selector(query.id.as_deref())?;
    let categories = state
        .catalog_service
        .categories(&ids, query.sort.as_deref())
        .await?;
    Ok(Json(categories))
}

/// GET /api/v1/course-categories/stats
async fn category_stats(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryStat>>, ApiError> {
    Ok(Json(state.catalog_service.category_stats().await?))
}

/// GET /api/v1/course-categories/levels-stats
async fn category_level_stats(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryLevelStat>>, ApiError> {
    Ok(Json(state.catalog_service.category_level_stats().await?))
}

/// GET /api/v1/course-levels?id=all
async fn list_levels(
    State(state): State<AppState>,
    Query(query): Query<ListLevelsQuery>,
) -> Result<Json<Vec<CourseLevel>>, ApiError> {
    let ids = id_selector(query.id.as_deref())?;
    Ok(Json(state.catalog_service.levels(&ids).await?))
}
