//! Access guard and identity resolution
//!
//! Every protected request goes through [`AccessGuard::authenticate`]. All
//! rejection reasons are reported to clients the same way; the variant of
//! [`AccessDenied`] only feeds the logs.

use crate::db::repositories::UserRepository;
use crate::models::User;
use crate::services::token::{TokenError, TokenService};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AccessDenied {
    #[error("No session token presented")]
    MissingToken,

    #[error("Invalid session token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The token is valid but its subject no longer exists
    #[error("Token subject {0} does not exist")]
    UnknownSubject(i64),

    #[error("Failed to resolve identity: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Maps token subjects to persisted users. Never caches, so role promotions
/// and profile edits are visible on the next request.
pub struct IdentityResolver {
    users: Arc<dyn UserRepository>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    pub async fn resolve(&self, subject: i64) -> Result<Option<User>, anyhow::Error> {
        self.users.get_by_id(subject).await
    }
}

/// Gate in front of every protected operation.
pub struct AccessGuard {
    tokens: Arc<TokenService>,
    identities: IdentityResolver,
}

impl AccessGuard {
    pub fn new(tokens: Arc<TokenService>, users: Arc<dyn UserRepository>) -> Self {
        Self {
            tokens,
            identities: IdentityResolver::new(users),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<User, AccessDenied> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AccessDenied::MissingToken)?;

        let claims = self.tokens.validate(token)?;

        self.identities
            .resolve(claims.sub)
            .await?
            .ok_or(AccessDenied::UnknownSubject(claims.sub))
    }
}
