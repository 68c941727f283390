//! User service
//!
//! Signup, login, profile updates and the teaching application workflow.
//! Password hashing and verification run on the blocking thread pool.

use crate::db::repositories::{is_unique_violation, UserRepository};
use crate::models::{CreateUserInput, IdSelector, TeachingApplication, UpdateProfile, User, UserType};
use crate::services::password::CredentialVerifier;
use crate::services::token::TokenService;
use anyhow::Context;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User {0} already submitted a teaching application")]
    AlreadyApplied(i64),

    #[error("User {0} not found")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct SignupInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// A successful login: the user and a freshly issued session token.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub token: String,
}

/// Answers submitted with a teaching application.
#[derive(Debug, Clone)]
pub struct TeachingApplicationInput {
    pub experience: String,
    pub motivation: String,
    pub platform_choice: String,
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    verifier: Arc<CredentialVerifier>,
    tokens: Arc<TokenService>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        verifier: Arc<CredentialVerifier>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            users,
            verifier,
            tokens,
        }
    }

    /// Register a new learner account.
    pub async fn signup(&self, input: SignupInput) -> Result<User, UserServiceError> {
        validate_signup(&input)?;
        let email = input.email.trim().to_string();

        if self
            .users
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let verifier = self.verifier.clone();
        let password = input.password;
        let password_hash = tokio::task::spawn_blocking(move || verifier.hash(&password))
            .await
            .context("Password hashing task failed")??;

        let created = self
            .users
            .create(&CreateUserInput {
                email: email.clone(),
                password_hash,
                user_type: UserType::Learner,
                first_name: input.first_name.trim().to_string(),
                last_name: input.last_name.trim().to_string(),
            })
            .await;

        match created {
            Ok(user) => {
                tracing::info!(user_id = user.id, "User signed up");
                Ok(user)
            }
            Err(e) if is_unique_violation(&e) => Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            ))),
            Err(e) => Err(e.context("Failed to create user").into()),
        }
    }

    /// Check credentials and issue a session token.
    ///
    /// Unknown emails, wrong passwords and unreadable stored hashes all yield
    /// the same `AuthenticationError`.
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutcome, UserServiceError> {
        let user = self
            .users
            .get_by_email(input.email.trim())
            .await
            .context("Failed to get user by email")?;

        let verifier = self.verifier.clone();
        let password = input.password;

        let Some(user) = user else {
            // Same argon2 cost as a real mismatch.
            tokio::task::spawn_blocking(move || verifier.verify_decoy(&password))
                .await
                .context("Password verification task failed")?;
            return Err(UserServiceError::AuthenticationError(
                INVALID_CREDENTIALS.to_string(),
            ));
        };

        let stored_hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || verifier.verify(&password, &stored_hash))
            .await
            .context("Password verification task failed")?;

        match verified {
            Ok(true) => {}
            Ok(false) => {
                return Err(UserServiceError::AuthenticationError(
                    INVALID_CREDENTIALS.to_string(),
                ))
            }
            Err(e) => {
                tracing::error!(user_id = user.id, error = %e, "Stored password hash is malformed");
                return Err(UserServiceError::AuthenticationError(
                    INVALID_CREDENTIALS.to_string(),
                ));
            }
        }

        let token = self
            .tokens
            .issue(user.id)
            .context("Failed to issue session token")?;
        tracing::info!(user_id = user.id, "User logged in");

        Ok(LoginOutcome { user, token })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .users
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    pub async fn list(&self, ids: &IdSelector) -> Result<Vec<User>, UserServiceError> {
        let users = self.users.list(ids).await.context("Failed to list users")?;
        Ok(users)
    }

    /// Apply a profile update. Blank names are rejected rather than stored.
    pub async fn update_profile(
        &self,
        user_id: i64,
        update: UpdateProfile,
    ) -> Result<User, UserServiceError> {
        let update = UpdateProfile {
            first_name: non_blank(update.first_name, "First name")?,
            last_name: non_blank(update.last_name, "Last name")?,
            profile_pic: update.profile_pic,
        };

        self.users
            .update_profile(user_id, &update)
            .await
            .context("Failed to update profile")?
            .ok_or(UserServiceError::NotFound(user_id))
    }

    /// Record a teaching application. Learners become educators; users who
    /// already rank higher keep their type. Returns whether a promotion happened.
    pub async fn apply_for_teaching(
        &self,
        user_id: i64,
        input: TeachingApplicationInput,
    ) -> Result<bool, UserServiceError> {
        for (value, field) in [
            (&input.experience, "Experience"),
            (&input.motivation, "Motivation"),
            (&input.platform_choice, "Platform choice"),
        ] {
            if value.trim().is_empty() {
                return Err(UserServiceError::ValidationError(format!(
                    "{} cannot be empty",
                    field
                )));
            }
        }

        let application = TeachingApplication {
            user_id,
            experience: input.experience,
            motivation: input.motivation,
            platform_choice: input.platform_choice,
            created_at: Utc::now(),
        };

        match self
            .users
            .submit_teaching_application(&application, UserType::Educator)
            .await
        {
            Ok(promoted) => {
                if promoted {
                    tracing::info!(user_id, "User promoted to educator");
                }
                Ok(promoted)
            }
            Err(e) if is_unique_violation(&e) => Err(UserServiceError::AlreadyApplied(user_id)),
            Err(e) => Err(e.context("Failed to submit teaching application").into()),
        }
    }
}

fn validate_signup(input: &SignupInput) -> Result<(), UserServiceError> {
    if input.first_name.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "First name cannot be empty".to_string(),
        ));
    }
    if input.last_name.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Last name cannot be empty".to_string(),
        ));
    }
    if !EMAIL_RE.is_match(input.email.trim()) {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    if input.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn non_blank(value: Option<String>, field: &str) -> Result<Option<String>, UserServiceError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(UserServiceError::ValidationError(format!(
            "{} cannot be empty",
            field
        ))),
        Some(v) => Ok(Some(v.trim().to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::DynDatabasePool;
    use crate::services::password::cheap_verifier;
    use chrono::Duration;

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = migrated_pool().await;
        let tokens = Arc::new(TokenService::new("user-service-secret", Duration::days(14)).unwrap());
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            Arc::new(cheap_verifier()),
            tokens,
        );
        (pool, service)
    }

    fn signup_input(email: &str) -> SignupInput {
        SignupInput {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            password: "password123".to_string(),
        }
    }

    fn login_input(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    // ========================================================================
    // Signup tests
    // ========================================================================

    #[tokio::test]
    async fn test_signup_creates_learner() {
        let (_pool, service) = setup_test_service().await;

        let user = service.signup(signup_input("ada@example.com")).await.unwrap();

        assert_eq!(user.user_type, UserType::Learner);
        assert_eq!(user.email, "ada@example.com");
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_signup_duplicate_email_fails() {
        let (_pool, service) = setup_test_service().await;
        service.signup(signup_input("same@example.com")).await.unwrap();

        let result = service.signup(signup_input("same@example.com")).await;
        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let (_pool, service) = setup_test_service().await;

        let mut short_password = signup_input("a@example.com");
        short_password.password = "1234567".to_string();
        let mut bad_email = signup_input("not-an-email");
        bad_email.password = "password123".to_string();
        let mut no_name = signup_input("b@example.com");
        no_name.first_name = "  ".to_string();

        for input in [short_password, bad_email, no_name] {
            let result = service.signup(input).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
        }
    }

    // ========================================================================
    // Login tests
    // ========================================================================

    #[tokio::test]
    async fn test_login_issues_token_for_user() {
        let (_pool, service) = setup_test_service().await;
        let user = service.signup(signup_input("login@example.com")).await.unwrap();

        let outcome = service
            .login(login_input("login@example.com", "password123"))
            .await
            .unwrap();

        assert_eq!(outcome.user.id, user.id);
        let claims = service.tokens.validate(&outcome.token).unwrap();
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn test_login_unknown_email_is_authentication_error() {
        let (_pool, service) = setup_test_service().await;

        let result = service
            .login(login_input("nobody@example.com", "password123"))
            .await;
        match result {
            Err(UserServiceError::AuthenticationError(msg)) => {
                assert_eq!(msg, INVALID_CREDENTIALS)
            }
            other => panic!("expected authentication error, got {:?}", other.map(|o| o.user.id)),
        }
    }

    #[tokio::test]
    async fn test_login_wrong_password_same_message() {
        let (_pool, service) = setup_test_service().await;
        service.signup(signup_input("pw@example.com")).await.unwrap();

        let result = service.login(login_input("pw@example.com", "wrong-password")).await;
        match result {
            Err(UserServiceError::AuthenticationError(msg)) => {
                assert_eq!(msg, INVALID_CREDENTIALS)
            }
            other => panic!("expected authentication error, got {:?}", other.map(|o| o.user.id)),
        }
    }

    #[tokio::test]
    async fn test_login_malformed_stored_hash_is_authentication_error() {
        let (pool, service) = setup_test_service().await;
        SqlxUserRepository::new(pool)
            .create(&CreateUserInput {
                email: "broken@example.com".to_string(),
                password_hash: "not-a-phc-string".to_string(),
                user_type: UserType::Learner,
                first_name: "B".to_string(),
                last_name: "H".to_string(),
            })
            .await
            .unwrap();

        let result = service
            .login(login_input("broken@example.com", "password123"))
            .await;
        assert!(matches!(result, Err(UserServiceError::AuthenticationError(_))));
    }

    // ========================================================================
    // Profile and teaching application tests
    // ========================================================================

    #[tokio::test]
    async fn test_update_profile() {
        let (_pool, service) = setup_test_service().await;
        let user = service.signup(signup_input("profile@example.com")).await.unwrap();

        let updated = service
            .update_profile(
                user.id,
                UpdateProfile {
                    first_name: Some(" Grace ".to_string()),
                    last_name: None,
                    profile_pic: Some("http://x/pp.png".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Grace");
        assert_eq!(updated.last_name, "Lovelace");
        assert_eq!(updated.profile_pic.as_deref(), Some("http://x/pp.png"));

        let blank = service
            .update_profile(
                user.id,
                UpdateProfile {
                    last_name: Some(String::new()),
                    ..UpdateProfile::default()
                },
            )
            .await;
        assert!(matches!(blank, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_teaching_application_promotes_and_rejects_duplicate() {
        let (_pool, service) = setup_test_service().await;
        let user = service.signup(signup_input("teach@example.com")).await.unwrap();
        let input = TeachingApplicationInput {
            experience: "10 years".to_string(),
            motivation: "Sharing".to_string(),
            platform_choice: "Plaja".to_string(),
        };

        assert!(service.apply_for_teaching(user.id, input.clone()).await.unwrap());
        let reloaded = service.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.user_type, UserType::Educator);

        let again = service.apply_for_teaching(user.id, input).await;
        assert!(matches!(again, Err(UserServiceError::AlreadyApplied(_))));
    }
}
