//! Course, exercise and catalog models
//!
//! A course's `length` is derived: it always equals the sum of its exercises'
//! lengths and is recomputed by the exercise aggregation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::filter::{IdSelector, SortDirection};

/// A course authored by an instructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub short_description: String,
    pub description: String,
    /// Public URL of the thumbnail image
    pub thumbnail: String,
    pub level_id: i64,
    pub status: CourseStatus,
    /// Owning user; the only identity allowed to mutate the course
    pub instructor_id: i64,
    /// Total reading time in minutes, derived from the exercises
    pub length: i64,
    pub price: i64,
    pub has_certificate: bool,
    /// Optimistic concurrency counter, bumped on every mutation
    pub version: i64,
    pub categories: Vec<CourseCategory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Course lifecycle state.
///
/// States are ordered but transitions are not restricted to neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    #[default]
    Draft,
    BeingValidated,
    RevisionsRequired,
    Published,
    Suspended,
    Archived,
}

impl CourseStatus {
    pub fn id(self) -> i64 {
        match self {
            CourseStatus::Draft => 1,
            CourseStatus::BeingValidated => 2,
            CourseStatus::RevisionsRequired => 3,
            CourseStatus::Published => 4,
            CourseStatus::Suspended => 5,
            CourseStatus::Archived => 6,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(CourseStatus::Draft),
            2 => Some(CourseStatus::BeingValidated),
            3 => Some(CourseStatus::RevisionsRequired),
            4 => Some(CourseStatus::Published),
            5 => Some(CourseStatus::Suspended),
            6 => Some(CourseStatus::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CourseStatus::Draft => "draft",
            CourseStatus::BeingValidated => "being validated",
            CourseStatus::RevisionsRequired => "revisions required",
            CourseStatus::Published => "published",
            CourseStatus::Suspended => "suspended",
            CourseStatus::Archived => "archived",
        };
        f.write_str(s)
    }
}

/// A course category (many-to-many with courses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCategory {
    pub id: i64,
    pub title: String,
}

/// A course difficulty level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseLevel {
    pub id: i64,
    pub title: String,
}

/// Number of courses attached to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub title: String,
    pub courses_count: i64,
}

/// Number of courses in a category at one level.
///
/// `level_title` is `None` for a category with no courses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLevelStat {
    pub category_title: String,
    pub level_title: Option<String>,
    pub courses_count: i64,
}

/// A unit of course content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseExercise {
    pub id: i64,
    pub course_id: i64,
    pub type_id: i64,
    pub title: String,
    pub content: String,
    /// Reading time in minutes, derived from `content`
    pub length: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a course row.
#[derive(Debug, Clone)]
pub struct CreateCourseInput {
    pub title: String,
    pub level_id: i64,
    pub has_certificate: bool,
    pub category_ids: Vec<i64>,
    pub thumbnail: String,
    pub instructor_id: i64,
}

/// General information an instructor may edit.
///
/// `thumbnail` is `None` when no new image was uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCourseGeneral {
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub price: i64,
    pub thumbnail: Option<String>,
}

/// Columns a course list may be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CourseSortField {
    #[default]
    Id,
    Title,
    StatusId,
    InstructorId,
    LevelId,
    HasCertificate,
    CreatedAt,
    UpdatedAt,
}

impl CourseSortField {
    pub fn parse(field: &str) -> Option<Self> {
        match field {
            "id" => Some(Self::Id),
            "title" | "name" => Some(Self::Title),
            "status_id" => Some(Self::StatusId),
            "instructor_id" => Some(Self::InstructorId),
            "level_id" => Some(Self::LevelId),
            "has_certificate" => Some(Self::HasCertificate),
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Id => "c.id",
            Self::Title => "c.title",
            Self::StatusId => "c.status_id",
            Self::InstructorId => "c.instructor_id",
            Self::LevelId => "c.level_id",
            Self::HasCertificate => "c.has_certificate",
            Self::CreatedAt => "c.created_at",
            Self::UpdatedAt => "c.updated_at",
        }
    }
}

/// Filters for listing courses. Every `Some` narrows the result.
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub ids: IdSelector,
    pub status: Option<CourseStatus>,
    pub instructor_id: Option<i64>,
    pub level_id: Option<i64>,
    /// Only courses this user is enrolled in
    pub enrolled_user_id: Option<i64>,
    pub has_certificate: Option<bool>,
    pub sort: CourseSortField,
    pub direction: SortDirection,
}
