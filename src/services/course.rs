//! Course service
//!
//! Course creation, listing and general-information updates. Every mutation
//! goes through the ownership enforcer first.
//!
//! A new thumbnail is staged before the version-checked update and only moved
//! into place once that update succeeds, so a losing update leaves the current
//! image alone.

use crate::db::repositories::{CatalogRepository, CourseRepository};
use crate::models::{Course, CourseFilter, CreateCourseInput, IdSelector, UpdateCourseGeneral};
use crate::services::ownership::{OwnershipEnforcer, OwnershipError};
use crate::services::storage::LocalFileStorage;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Logical path of the thumbnail used until an instructor uploads one
pub const DEFAULT_THUMBNAIL_PATH: &str = "service/courses/no-thumbnail.png";

/// Errors shared by the course and exercise services
#[derive(Debug, thiserror::Error)]
pub enum CourseServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Lost an optimistic concurrency race
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence deadline exceeded")]
    Timeout,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<OwnershipError> for CourseServiceError {
    fn from(err: OwnershipError) -> Self {
        match err {
            OwnershipError::CourseNotFound(id) => {
                CourseServiceError::NotFound(format!("Course {} not found", id))
            }
            OwnershipError::Forbidden { .. } => CourseServiceError::Forbidden(
                "Only the course instructor may modify this course".to_string(),
            ),
            OwnershipError::Internal(e) => CourseServiceError::InternalError(e),
        }
    }
}

/// Fields accepted when creating a course.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub level_id: i64,
    pub has_certificate: bool,
    pub category_ids: Vec<i64>,
}

/// A general-information update, with an optional new thumbnail image.
#[derive(Debug, Clone)]
pub struct CourseGeneralEdit {
    pub course_id: i64,
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub price: i64,
    pub thumbnail: Option<Vec<u8>>,
}

pub struct CourseService {
    courses: Arc<dyn CourseRepository>,
    catalog: Arc<dyn CatalogRepository>,
    ownership: Arc<OwnershipEnforcer>,
    storage: Arc<LocalFileStorage>,
    deadline: Duration,
}

impl CourseService {
    pub fn new(
        courses: Arc<dyn CourseRepository>,
        catalog: Arc<dyn CatalogRepository>,
        ownership: Arc<OwnershipEnforcer>,
        storage: Arc<LocalFileStorage>,
        deadline: Duration,
    ) -> Self {
        Self {
            courses,
            catalog,
            ownership,
            storage,
            deadline,
        }
    }

    /// Create a draft course owned by `instructor_id`.
    pub async fn create(
        &self,
        instructor_id: i64,
        input: NewCourse,
    ) -> Result<Course, CourseServiceError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(CourseServiceError::ValidationError(
                "Title cannot be empty".to_string(),
            ));
        }

        let levels = self
            .catalog
            .list_levels(&IdSelector::Ids(vec![input.level_id]))
            .await
            .context("Failed to check course level")?;
        if levels.is_empty() {
            return Err(CourseServiceError::ValidationError(format!(
                "Unknown course level {}",
                input.level_id
            )));
        }

        let mut category_ids = input.category_ids;
        category_ids.sort_unstable();
        category_ids.dedup();
        if !category_ids.is_empty() {
            let found = self
                .catalog
                .list_categories(&IdSelector::Ids(category_ids.clone()), false)
                .await
                .context("Failed to check course categories")?;
            if let Some(missing) = category_ids
                .iter()
                .find(|id| !found.iter().any(|c| c.id == **id))
            {
                return Err(CourseServiceError::ValidationError(format!(
                    "Unknown course category {}",
                    missing
                )));
            }
        }

        let course = self
            .courses
            .create(&CreateCourseInput {
                title: title.to_string(),
                level_id: input.level_id,
                has_certificate: input.has_certificate,
                category_ids,
                thumbnail: self.storage.url_for(DEFAULT_THUMBNAIL_PATH),
                instructor_id,
            })
            .await
            .context("Failed to create course")?;

        tracing::info!(course_id = course.id, instructor_id, "Course created");
        Ok(course)
    }

    pub async fn list(&self, filter: &CourseFilter) -> Result<Vec<Course>, CourseServiceError> {
        let courses = self
            .courses
            .list(filter)
            .await
            .context("Failed to list courses")?;
        Ok(courses)
    }

    /// Overwrite a course's general information, storing a new thumbnail
    /// when one is supplied. Only the course's instructor may do this.
    pub async fn update_general(
        &self,
        actor_id: i64,
        edit: CourseGeneralEdit,
    ) -> Result<Course, CourseServiceError> {
        let course = self.ownership.authorize(actor_id, edit.course_id).await?;

        let title = edit.title.trim();
        if title.is_empty() {
            return Err(CourseServiceError::ValidationError(
                "Title cannot be empty".to_string(),
            ));
        }
        if edit.price < 0 {
            return Err(CourseServiceError::ValidationError(
                "Price cannot be negative".to_string(),
            ));
        }

        let staged = match edit.thumbnail {
            Some(bytes) => Some(
                self.storage
                    .stage(&format!("courses/thumbnails/{}-thumbnail.png", course.id), &bytes)
                    .await
                    .context("Failed to store course thumbnail")?,
            ),
            None => None,
        };

        let update = UpdateCourseGeneral {
            title: title.to_string(),
            short_description: edit.short_description,
            description: edit.description,
            price: edit.price,
            thumbnail: staged.as_ref().map(|file| file.url().to_string()),
        };

        let result = self.apply_general(course.id, actor_id, &update).await;
        let updated = match (result, staged) {
            (Ok(updated), Some(file)) => {
                file.commit()
                    .await
                    .context("Failed to store course thumbnail")?;
                updated
            }
            (Ok(updated), None) => updated,
            (Err(e), Some(file)) => {
                file.discard().await;
                return Err(e);
            }
            (Err(e), None) => return Err(e),
        };

        tracing::info!(course_id = updated.id, version = updated.version, "Course updated");
        Ok(updated)
    }

    async fn apply_general(
        &self,
        course_id: i64,
        actor_id: i64,
        update: &UpdateCourseGeneral,
    ) -> Result<Course, CourseServiceError> {
        tokio::time::timeout(
            self.deadline,
            self.courses.update_general(course_id, actor_id, update),
        )
        .await
        .map_err(|_| {
            tracing::error!(course_id, "Course update exceeded deadline");
            CourseServiceError::Timeout
        })?
        .context("Failed to update course")?
        .ok_or_else(|| {
            CourseServiceError::Conflict(format!(
                "Course {} changed while it was being updated",
                course_id
            ))
        })
    }
}
