//! Course and exercise API endpoints
//!
//! Course bodies keep the PascalCase field names the web client sends
//! (`CourseID`, `LevelID`, `Exercises`, ...). Responses are snake_case.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{id_selector, optional_param, required_param, FormData, JsonBody};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    Course, CourseExercise, CourseFilter, CourseSortField, CourseStatus, SortDirection,
};
use crate::services::{CourseGeneralEdit, ExerciseDraft, NewCourse, ReconcileOutcome, ReconcileRequest};

#[derive(Debug, Default, Deserialize)]
pub struct ListCoursesQuery {
    pub id: Option<String>,
    pub status_id: Option<String>,
    pub instructor_id: Option<String>,
    pub level_id: Option<String>,
    pub user_id: Option<String>,
    pub has_certificate: Option<String>,
    pub sort: Option<String>,
}

impl ListCoursesQuery {
    /// Translate raw query values into a repository filter.
    pub fn into_filter(self) -> Result<CourseFilter, ApiError> {
        let status = optional_param::<i64>("status_id", self.status_id.as_deref())?
            .map(|id| {
                CourseStatus::from_id(id)
                    .ok_or_else(|| ApiError::validation_error(format!("Unknown status_id {}", id)))
            })
            .transpose()?;

        let (sort, direction) = match self.sort.as_deref().map(str::trim) {
            None | Some("") => (CourseSortField::default(), SortDirection::default()),
            Some(raw) => {
                let (field, direction) = SortDirection::split(raw);
                let field = CourseSortField::parse(field).ok_or_else(|| {
                    ApiError::validation_error(format!("Unknown sort field '{}'", field))
                })?;
                (field, direction)
            }
        };

        Ok(CourseFilter {
            ids: id_selector(self.id.as_deref())?,
            status,
            instructor_id: optional_param("instructor_id", self.instructor_id.as_deref())?,
            level_id: optional_param("level_id", self.level_id.as_deref())?,
            enrolled_user_id: optional_param("user_id", self.user_id.as_deref())?,
            has_certificate: optional_param("has_certificate", self.has_certificate.as_deref())?,
            sort,
            direction,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryRef {
    #[serde(rename = "ID")]
    pub id: i64,
}

/// Request body for course creation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateCourseRequest {
    pub title: String,
    #[serde(rename = "LevelID")]
    pub level_id: i64,
    #[serde(default)]
    pub has_certificate: bool,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
}

#[derive(Debug, Deserialize)]
pub struct ListExercisesQuery {
    pub course_id: Option<String>,
    pub exercise_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExerciseBody {
    /// Absent or zero for a new exercise
    #[serde(rename = "ID", default)]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Request body for exercise reconciliation.
///
/// Any `InstructorID` the client sends is ignored; the session decides.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReconcileExercisesRequest {
    #[serde(rename = "CourseID")]
    pub course_id: i64,
    #[serde(default)]
    pub exercises: Vec<ExerciseBody>,
    #[serde(default)]
    pub exercises_to_delete: Vec<i64>,
}

impl From<ReconcileExercisesRequest> for ReconcileRequest {
    fn from(body: ReconcileExercisesRequest) -> Self {
        Self {
            course_id: body.course_id,
            upserts: body
                .exercises
                .into_iter()
                .map(|exercise| ExerciseDraft {
                    id: exercise.id.filter(|id| *id != 0),
                    title: exercise.title,
                    content: exercise.content,
                })
                .collect(),
            delete_ids: body.exercises_to_delete,
        }
    }
}

/// Routes reachable without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses))
        .route("/course-exercises", get(list_exercises))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/courses/create", post(create_course))
        .route("/courses/update-general", post(update_general))
        .route("/course-exercises/create-update", post(reconcile_exercises))
}

/// GET /api/v1/courses
async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListCoursesQuery>,
) -> Result<Json<Vec<Course>>, ApiError> {
    let filter = query.into_filter()?;
    let courses = state.course_service.list(&filter).await?;
    Ok(Json(courses))
}

/// POST /api/v1/courses/create
async fn create_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(body): JsonBody<CreateCourseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let course = state
        .course_service
        .create(
            user.0.id,
            NewCourse {
                title: body.title,
                level_id: body.level_id,
                has_certificate: body.has_certificate,
                category_ids: body.categories.into_iter().map(|c| c.id).collect(),
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(course)))
}

/// POST /api/v1/courses/update-general
///
/// Multipart fields: CourseID, Title, ShortDescription, Description, Price,
/// and an optional Thumbnail file.
async fn update_general(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<Course>, ApiError> {
    let mut form = FormData::read(multipart, state.storage.max_file_size()).await?;

    let edit = CourseGeneralEdit {
        course_id: form.required_number("CourseID")?,
        title: form.required_text("Title")?,
        short_description: form.text_or_empty("ShortDescription"),
        description: form.text_or_empty("Description"),
        price: form.optional_number("Price")?.unwrap_or(0),
        thumbnail: form.take_file("Thumbnail"),
    };

    let course = state.course_service.update_general(user.0.id, edit).await?;
    Ok(Json(course))
}

/// GET /api/v1/course-exercises?course_id=1&exercise_id=all
async fn list_exercises(
    State(state): State<AppState>,
    Query(query): Query<ListExercisesQuery>,
) -> Result<Json<Vec<CourseExercise>>, ApiError> {
    let course_id: i64 = required_param("course_id", query.course_id.as_deref())?;
    let ids = id_selector(query.exercise_id.as_deref())?;
    let exercises = state.exercise_service.list(course_id, &ids).await?;
    Ok(Json(exercises))
}

/// POST /api/v1/course-exercises/create-update
async fn reconcile_exercises(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(body): JsonBody<ReconcileExercisesRequest>,
) -> Result<(StatusCode, Json<ReconcileOutcome>), ApiError> {
    let outcome = state
        .exercise_service
        .reconcile(user.0.id, body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdSelector;

    #[test]
    fn test_course_query_into_filter() {
        let filter = ListCoursesQuery {
            id: Some("1,2".to_string()),
            status_id: Some("4".to_string()),
            has_certificate: Some("true".to_string()),
            sort: Some("-created_at".to_string()),
            ..ListCoursesQuery::default()
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.ids, IdSelector::Ids(vec![1, 2]));
        assert_eq!(filter.status, Some(CourseStatus::Published));
        assert_eq!(filter.has_certificate, Some(true));
        assert_eq!(filter.sort, CourseSortField::CreatedAt);
        assert_eq!(filter.direction, SortDirection::Desc);
    }

    #[test]
    fn test_course_query_rejects_bad_values() {
        let bad_sort = ListCoursesQuery {
            sort: Some("price".to_string()),
            ..ListCoursesQuery::default()
        };
        assert_eq!(bad_sort.into_filter().unwrap_err().status(), StatusCode::BAD_REQUEST);

        let bad_status = ListCoursesQuery {
            status_id: Some("9".to_string()),
            ..ListCoursesQuery::default()
        };
        assert!(bad_status.into_filter().is_err());

        let bad_level = ListCoursesQuery {
            level_id: Some("easy".to_string()),
            ..ListCoursesQuery::default()
        };
        assert!(bad_level.into_filter().is_err());
    }

    #[test]
    fn test_reconcile_body_zero_id_means_new() {
        let body: ReconcileExercisesRequest = serde_json::from_value(serde_json::json!({
            "CourseID": 7,
            "InstructorID": 99,
            "Exercises": [
                {"ID": 0, "Title": "New", "Content": "a b c"},
                {"ID": 12, "Title": "Old", "Content": "d"},
                {"Title": "Also new"}
            ],
            "ExercisesToDelete": [3]
        }))
        .unwrap();

        let request = ReconcileRequest::from(body);
        assert_eq!(request.course_id, 7);
        let ids: Vec<_> = request.upserts.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![None, Some(12), None]);
        assert_eq!(request.delete_ids, vec![3]);
    }

    #[test]
    fn test_create_course_body() {
        let body: CreateCourseRequest = serde_json::from_value(serde_json::json!({
            "Title": "Rust",
            "LevelID": 2,
            "HasCertificate": true,
            "Categories": [{"ID": 1}, {"ID": 3}]
        }))
        .unwrap();
        assert_eq!(body.level_id, 2);
        assert_eq!(body.categories.len(), 2);
    }
}
