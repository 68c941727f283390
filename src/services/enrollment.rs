//! Enrollment service
//!
//! Learners enroll themselves; certificates are only listed here.

use crate::db::repositories::{is_unique_violation, CourseRepository, EnrollmentRepository};
use crate::models::{CertificateFilter, CourseCertificate, Enrollment, EnrollmentFilter};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentServiceError {
    #[error("Course {0} not found")]
    CourseNotFound(i64),

    #[error("User {user_id} is already enrolled in course {course_id}")]
    AlreadyEnrolled { user_id: i64, course_id: i64 },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct EnrollmentService {
    enrollments: Arc<dyn EnrollmentRepository>,
    courses: Arc<dyn CourseRepository>,
}

impl EnrollmentService {
    pub fn new(
        enrollments: Arc<dyn EnrollmentRepository>,
        courses: Arc<dyn CourseRepository>,
    ) -> Self {
        Self {
            enrollments,
            courses,
        }
    }

    pub async fn list(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>, EnrollmentServiceError> {
        let enrollments = self
            .enrollments
            .list(filter)
            .await
            .context("Failed to list enrollments")?;
        Ok(enrollments)
    }

    /// Enroll `user_id` in a course.
    pub async fn enroll(&self, user_id: i64, course_id: i64) -> Result<Enrollment, EnrollmentServiceError> {
        if self
            .courses
            .get_by_id(course_id)
            .await
            .context("Failed to load course")?
            .is_none()
        {
            return Err(EnrollmentServiceError::CourseNotFound(course_id));
        }

        match self.enrollments.create(user_id, course_id).await {
            Ok(enrollment) => {
                tracing::info!(user_id, course_id, "User enrolled");
                Ok(enrollment)
            }
            Err(e) if is_unique_violation(&e) => {
                Err(EnrollmentServiceError::AlreadyEnrolled { user_id, course_id })
            }
            Err(e) => Err(e.context("Failed to create enrollment").into()),
        }
    }

    pub async fn certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<CourseCertificate>, EnrollmentServiceError> {
        let certificates = self
            .enrollments
            .list_certificates(filter)
            .await
            .context("Failed to list certificates")?;
        Ok(certificates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, migrated_pool};
    use crate::db::repositories::{SqlxCourseRepository, SqlxEnrollmentRepository};
    use crate::models::{CreateCourseInput, UserType};

    #[tokio::test]
    async fn test_enroll_missing_course_and_duplicate() {
        let pool = migrated_pool().await;
        let instructor = insert_user(&pool, UserType::Educator).await;
        let learner = insert_user(&pool, UserType::Learner).await;
        let courses = SqlxCourseRepository::boxed(pool.clone());
        let course = courses
            .create(&CreateCourseInput {
                title: "Enroll me".to_string(),
                level_id: 1,
                has_certificate: false,
                category_ids: vec![],
                thumbnail: String::new(),
                instructor_id: instructor,
            })
            .await
            .unwrap();
        let service = EnrollmentService::new(SqlxEnrollmentRepository::boxed(pool), courses);

        assert!(matches!(
            service.enroll(learner, course.id + 1).await,
            Err(EnrollmentServiceError::CourseNotFound(_))
        ));

        let enrollment = service.enroll(learner, course.id).await.unwrap();
        assert_eq!(enrollment.course_id, course.id);

        assert!(matches!(
            service.enroll(learner, course.id).await,
            Err(EnrollmentServiceError::AlreadyEnrolled { .. })
        ));

        let listed = service
            .list(&EnrollmentFilter {
                course_id: Some(course.id),
                ..EnrollmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
