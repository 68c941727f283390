//! Enrollment and certificate models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A learner's participation in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub user_id: i64,
    pub course_id: i64,
    /// Completion percentage, 0 to 100
    pub progress: i64,
    pub status: EnrollmentStatus,
    pub last_exercise_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    #[default]
    Enrolled,
    Completed,
}

impl EnrollmentStatus {
    pub fn id(self) -> i64 {
        match self {
            EnrollmentStatus::Enrolled => 1,
            EnrollmentStatus::Completed => 2,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(EnrollmentStatus::Enrolled),
            2 => Some(EnrollmentStatus::Completed),
            _ => None,
        }
    }
}

/// Filters for listing enrollments.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentFilter {
    pub user_ids: Option<Vec<i64>>,
    pub status_ids: Option<Vec<i64>>,
    pub course_id: Option<i64>,
}

/// A certificate awarded for finishing a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCertificate {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Filters for listing certificates.
#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub ids: Option<Vec<i64>>,
    pub user_id: Option<i64>,
    pub course_id: Option<i64>,
}
