//! User API endpoints
//!
//! Signup, login/logout with the session cookie, profile reads and updates,
//! and the teaching application that promotes a learner to educator.

use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{id_selector, FormData, JsonBody};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{
    LoginResponse, MessageResponse, TeachingApplicationResponse, UserResponse,
};
use crate::models::UpdateProfile;
use crate::services::{LoginInput, SignupInput, TeachingApplicationInput};

/// Request body for signup
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Request body for login
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for a teaching application
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TeachingApplicationRequest {
    pub experience: String,
    pub motivation: String,
    pub platform_choice: String,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub id: Option<String>,
}

/// Routes reachable without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/users/getme", get(get_me))
        .route("/users/update-user", post(update_user))
        .route("/teaching-applications/create", post(apply_for_teaching))
}

/// POST /api/v1/users/signup
async fn signup(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_service
        .signup(SignupInput {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /api/v1/users/login
///
/// Returns the token in the body and sets it as the session cookie.
async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .user_service
        .login(LoginInput {
            email: body.email,
            password: body.password,
        })
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&state.session_cookie.set(&outcome.token))
            .map_err(ApiError::internal_error)?,
    );

    Ok((
        headers,
        Json(LoginResponse {
            user: outcome.user.into(),
            token: outcome.token,
        }),
    ))
}

/// POST /api/v1/users/logout
///
/// Tokens are stateless; logging out only drops the cookie.
async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&state.session_cookie.clear()).map_err(ApiError::internal_error)?,
    );
    Ok((headers, Json(MessageResponse::new("Logged out"))))
}

/// GET /api/v1/users?id=all|1,2,3
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let ids = id_selector(query.id.as_deref())?;
    let users = state.user_service.list(&ids).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /api/v1/users/getme
async fn get_me(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// POST /api/v1/users/update-user (multipart: FirstName, LastName, ProfilePic)
async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = user.0.id;
    let mut form = FormData::read(multipart, state.storage.max_file_size()).await?;

    let profile_pic = match form.take_file("ProfilePic") {
        Some(bytes) => Some(
            state
                .storage
                .store(&format!("users/profile-pictures/{}-pp.png", user_id), &bytes)
                .await
                .map_err(|e| ApiError::internal_error(format!("{:#}", e)))?,
        ),
        None => None,
    };

    let update = UpdateProfile {
        first_name: form.text("FirstName"),
        last_name: form.text("LastName"),
        profile_pic,
    };
    if update.is_empty() {
        return Ok(Json(user.0.into()));
    }

    let updated = state.user_service.update_profile(user_id, update).await?;
    Ok(Json(updated.into()))
}

/// POST /api/v1/teaching-applications/create
async fn apply_for_teaching(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(body): JsonBody<TeachingApplicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let promoted = state
        .user_service
        .apply_for_teaching(
            user.0.id,
            TeachingApplicationInput {
                experience: body.experience,
                motivation: body.motivation,
                platform_choice: body.platform_choice,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TeachingApplicationResponse { promoted }),
    ))
}
