//! API middleware
//!
//! Shared application state, the error type every handler returns, the session
//! cookie, and the `require_auth` gate for protected routes.

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxCatalogRepository, SqlxCourseRepository, SqlxEnrollmentRepository,
    SqlxExerciseRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{InvalidIdList, User};
use crate::services::{
    AccessDenied, AccessGuard, CatalogService, CourseService, CourseServiceError,
    CredentialVerifier, EnrollmentService, EnrollmentServiceError, ExerciseService,
    LocalFileStorage, OwnershipEnforcer, TokenService, UserService, UserServiceError,
    SESSION_COOKIE,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub access_guard: Arc<AccessGuard>,
    pub user_service: Arc<UserService>,
    pub course_service: Arc<CourseService>,
    pub exercise_service: Arc<ExerciseService>,
    pub catalog_service: Arc<CatalogService>,
    pub enrollment_service: Arc<EnrollmentService>,
    pub storage: Arc<LocalFileStorage>,
    pub session_cookie: SessionCookie,
}

impl AppState {
    /// Wire repositories and services for a migrated pool.
    pub fn from_config(pool: DynDatabasePool, config: &Config) -> anyhow::Result<Self> {
        let users = SqlxUserRepository::boxed(pool.clone());
        let courses = SqlxCourseRepository::boxed(pool.clone());
        let catalog = SqlxCatalogRepository::boxed(pool.clone());

        let ttl = Duration::try_days(config.auth.token_ttl_days)
            .ok_or_else(|| anyhow::anyhow!("auth.token_ttl_days is out of range"))?;
        let tokens = Arc::new(TokenService::new(&config.auth.jwt_secret, ttl)?);
        let verifier = Arc::new(CredentialVerifier::new(&config.auth.password)?);
        let storage = Arc::new(LocalFileStorage::new(&config.storage));
        let ownership = Arc::new(OwnershipEnforcer::new(courses.clone()));

        Ok(Self {
            access_guard: Arc::new(AccessGuard::new(tokens.clone(), users.clone())),
            user_service: Arc::new(UserService::new(users, verifier, tokens)),
            course_service: Arc::new(CourseService::new(
                courses.clone(),
                catalog.clone(),
                ownership.clone(),
                storage.clone(),
                config.server.persistence_timeout(),
            )),
            exercise_service: Arc::new(ExerciseService::new(
                SqlxExerciseRepository::boxed(pool.clone()),
                ownership,
                config.server.persistence_timeout(),
            )),
            catalog_service: Arc::new(CatalogService::new(catalog)),
            enrollment_service: Arc::new(EnrollmentService::new(
                SqlxEnrollmentRepository::boxed(pool),
                courses,
            )),
            storage,
            session_cookie: SessionCookie {
                max_age_days: config.auth.cookie_max_age_days,
                secure: config.auth.cookie_secure,
            },
        })
    }
}

/// Attributes of the session cookie.
///
/// The cookie may outlive the token inside it; an expired token in a live
/// cookie is rejected by the guard like any other invalid token.
#[derive(Debug, Clone, Copy)]
pub struct SessionCookie {
    pub max_age_days: i64,
    pub secure: bool,
}

impl SessionCookie {
    pub fn set(&self, token: &str) -> String {
        self.render(token, self.max_age_days.saturating_mul(24 * 60 * 60))
    }

    pub fn clear(&self) -> String {
        self.render("", 0)
    }

    fn render(&self, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized(AUTHENTICATION_REQUIRED))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

const AUTHENTICATION_REQUIRED: &str = "Authentication required";

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("TIMEOUT", message)
    }

    /// Log the cause and hide it from the client.
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "Internal error while handling request");
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "TIMEOUT" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            e @ UserServiceError::AlreadyApplied(_) => ApiError::conflict(e.to_string()),
            e @ UserServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            UserServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<CourseServiceError> for ApiError {
    fn from(err: CourseServiceError) -> Self {
        match err {
            CourseServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CourseServiceError::NotFound(msg) => ApiError::not_found(msg),
            CourseServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            CourseServiceError::Conflict(msg) => ApiError::conflict(msg),
            CourseServiceError::Timeout => {
                ApiError::timeout("The operation took too long, please retry")
            }
            CourseServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<EnrollmentServiceError> for ApiError {
    fn from(err: EnrollmentServiceError) -> Self {
        match err {
            e @ EnrollmentServiceError::CourseNotFound(_) => ApiError::not_found(e.to_string()),
            e @ EnrollmentServiceError::AlreadyEnrolled { .. } => ApiError::conflict(e.to_string()),
            EnrollmentServiceError::InternalError(e) => {
                ApiError::internal_error(format!("{:#}", e))
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation_error(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<InvalidIdList> for ApiError {
    fn from(err: InvalidIdList) -> Self {
        ApiError::validation_error(err.to_string())
    }
}

/// Extract the session token: `Authorization: Bearer` first, then the cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    let cookie_prefix = format!("{}=", SESSION_COOKIE);
    for cookie_header in headers.get_all(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix(&cookie_prefix) {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware
///
/// Every rejection yields the same 401 body; the reason is only logged.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers());

    match state.access_guard.authenticate(token.as_deref()).await {
        Ok(user) => {
            request.extensions_mut().insert(AuthenticatedUser(user));
            Ok(next.run(request).await)
        }
        Err(AccessDenied::Internal(e)) => Err(ApiError::internal_error(format!("{:#}", e))),
        Err(reason) => {
            tracing::debug!(%reason, path = %request.uri().path(), "Rejected request");
            Err(ApiError::unauthorized(AUTHENTICATION_REQUIRED))
        }
    }
}
