//! Course ownership checks
//!
//! Ownership is read from the store on every call and never carried on the
//! session token, so reassigning a course takes effect immediately.

use crate::db::repositories::CourseRepository;
use crate::models::Course;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum OwnershipError {
    #[error("Course {0} not found")]
    CourseNotFound(i64),

    #[error("User {actor} does not own course {course}")]
    Forbidden { actor: i64, course: i64 },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct OwnershipEnforcer {
    courses: Arc<dyn CourseRepository>,
}

impl OwnershipEnforcer {
    pub fn new(courses: Arc<dyn CourseRepository>) -> Self {
        Self { courses }
    }

    /// Load a course and make sure `actor_id` is its instructor.
    pub async fn authorize(&self, actor_id: i64, course_id: i64) -> Result<Course, OwnershipError> {
        let course = self
            .courses
            .get_by_id(course_id)
            .await?
            .ok_or(OwnershipError::CourseNotFound(course_id))?;
        ensure_owner(actor_id, &course)?;
        Ok(course)
    }
}

/// Role plays no part: admins are held to the same rule.
pub fn ensure_owner(actor_id: i64, course: &Course) -> Result<(), OwnershipError> {
    if course.instructor_id == actor_id {
        Ok(())
    } else {
        Err(OwnershipError::Forbidden {
            actor: actor_id,
            course: course.id,
        })
    }
}
