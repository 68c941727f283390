//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They validate
//! input, enforce authentication and ownership rules, and translate repository
//! failures into typed errors.

pub mod access;
pub mod catalog;
pub mod course;
pub mod enrollment;
pub mod exercise;
pub mod ownership;
pub mod password;
pub mod storage;
pub mod token;
pub mod user;

pub use access::{AccessDenied, AccessGuard, IdentityResolver};
pub use catalog::CatalogService;
pub use course::{CourseGeneralEdit, CourseService, CourseServiceError, NewCourse};
pub use enrollment::{EnrollmentService, EnrollmentServiceError};
pub use exercise::{
    estimate_length, ExerciseDraft, ExerciseService, ReconcileOutcome, ReconcileRequest,
    READING_SPEED_WPM,
};
pub use ownership::{OwnershipEnforcer, OwnershipError};
pub use password::CredentialVerifier;
pub use storage::{LocalFileStorage, StagedFile};
pub use token::{Claims, TokenError, TokenService, SESSION_COOKIE};
pub use user::{
    LoginInput, LoginOutcome, SignupInput, TeachingApplicationInput, UserService,
    UserServiceError,
};
