//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Users, sessions and teaching applications
//! - Courses and course exercises
//! - Course categories and levels
//! - Enrollments and certificates
//! - Uploaded files under `/api/v1/storage`

pub mod catalog;
pub mod common;
pub mod courses;
pub mod enrollments;
pub mod middleware;
pub mod responses;
pub mod users;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

use crate::config::Config;

pub use middleware::{ApiError, AppState, AuthenticatedUser, SessionCookie};

/// Slack on top of the largest upload for the other multipart fields.
const FORM_OVERHEAD: usize = 1024 * 1024;

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid session)
    let protected_routes = Router::new()
        .merge(users::protected_router())
        .merge(courses::protected_router())
        .merge(enrollments::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .merge(users::public_router())
        .merge(courses::public_router())
        .merge(catalog::router())
        .merge(enrollments::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, config: &Config) -> anyhow::Result<Router> {
    // Credentials are allowed so the session cookie travels cross-origin.
    let origin = config
        .server
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin '{}'", config.server.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let storage = ServeDir::new(state.storage.root());

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest_service("/api/v1/storage", storage)
        .layer(DefaultBodyLimit::max(
            config.storage.max_file_size + FORM_OVERHEAD,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state))
}
