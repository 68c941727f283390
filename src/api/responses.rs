//! Shared API response types

use serde::{Deserialize, Serialize};

use crate::models::User;

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub user_type: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            user_type: user.user_type.to_string(),
            first_name: user.first_name,
            last_name: user.last_name,
            profile_pic: user.profile_pic,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Response for a successful login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for a recorded teaching application
#[derive(Debug, Serialize, Deserialize)]
pub struct TeachingApplicationResponse {
    /// Whether the applicant was promoted to educator by this application
    pub promoted: bool,
}

/// Plain confirmation message
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
