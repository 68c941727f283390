//! User model
//!
//! Users are created on signup as learners. The teaching application workflow
//! promotes them to educators; admins are assigned out of band.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub user_type: UserType,
    pub first_name: String,
    pub last_name: String,
    /// Public URL of the profile picture, if one was uploaded
    pub profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role tier. The derived ordering is the privilege ordering:
/// `Learner < Educator < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Learner,
    Educator,
    Admin,
}

impl UserType {
    /// Identifier stored in the `user_type_id` column
    pub fn id(self) -> i64 {
        match self {
            UserType::Learner => 1,
            UserType::Educator => 2,
            UserType::Admin => 3,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(UserType::Learner),
            2 => Some(UserType::Educator),
            3 => Some(UserType::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserType::Learner => write!(f, "learner"),
            UserType::Educator => write!(f, "educator"),
            UserType::Admin => write!(f, "admin"),
        }
    }
}

/// Input for creating a new user row. The password is already hashed.
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub email: String,
    pub password_hash: String,
    pub user_type: UserType,
    pub first_name: String,
    pub last_name: String,
}

/// Profile fields a user may change about themselves.
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_pic: Option<String>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.profile_pic.is_none()
    }
}

/// A request to become an educator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeachingApplication {
    pub user_id: i64,
    pub experience: String,
    pub motivation: String,
    pub platform_choice: String,
    pub created_at: DateTime<Utc>,
}
