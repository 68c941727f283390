//! Enrollment and certificate API endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{optional_id_list, optional_param, JsonBody};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CertificateFilter, CourseCertificate, Enrollment, EnrollmentFilter};

#[derive(Debug, Deserialize)]
pub struct ListEnrollmentsQuery {
    pub user_id: Option<String>,
    pub course_id: Option<String>,
    pub status_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListCertificatesQuery {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub course_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    #[serde(rename = "CourseID")]
    pub course_id: i64,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/enrollments", get(list_enrollments))
        .route("/course-certificates", get(list_certificates))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/enrollments/create", post(enroll))
}

/// GET /api/v1/enrollments?user_id=1,2&course_id=3&status_id=1
async fn list_enrollments(
    State(state): State<AppState>,
    Query(query): Query<ListEnrollmentsQuery>,
) -> Result<Json<Vec<Enrollment>>, ApiError> {
    let filter = EnrollmentFilter {
        user_ids: optional_id_list(query.user_id.as_deref())?,
        status_ids: optional_id_list(query.status_id.as_deref())?,
        course_id: optional_param("course_id", query.course_id.as_deref())?,
    };
    Ok(Json(state.enrollment_service.list(&filter).await?))
}

/// POST /api/v1/enrollments/create
///
/// Enrolls the current user.
async fn enroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(body): JsonBody<EnrollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let enrollment = state
        .enrollment_service
        .enroll(user.0.id, body.course_id)
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// GET /api/v1/course-certificates?id=1,2&user_id=3&course_id=4
async fn list_certificates(
    State(state): State<AppState>,
    Query(query): Query<ListCertificatesQuery>,
) -> Result<Json<Vec<CourseCertificate>>, ApiError> {
    let filter = CertificateFilter {
        ids: optional_id_list(query.id.as_deref())?,
        user_id: optional_param("user_id", query.user_id.as_deref())?,
        course_id: optional_param("course_id", query.course_id.as_deref())?,
    };
    Ok(Json(state.enrollment_service.certificates(&filter).await?))
}
