//! Session token service
//!
//! Issues and validates HS256-signed compact JWTs. Tokens are stateless: there
//! is no server-side store, so a token stays valid until `exp` even after the
//! client logs out.
//!
//! Expiry is compared without clock-skew leeway.

use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "pja_user_jwt";

/// The only signing algorithm accepted.
pub const ALGORITHM: &str = "HS256";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The signing secret is unset or empty
    #[error("Token secret is not configured")]
    MissingSecret,

    /// Bad structure, encoding or signature
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Header names an algorithm other than HS256
    #[error("Unexpected signing algorithm: {0}")]
    WrongAlgorithm(String),

    #[error("Token expired")]
    Expired,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    /// Expiry, unix seconds
    pub exp: i64,
    /// Issued at, unix seconds
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Issues and validates session tokens with a process-wide secret.
pub struct TokenService {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        })
    }

    /// How long an issued token stays valid.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: i64) -> Result<String, TokenError> {
        self.issue_at(subject, Utc::now())
    }

    pub fn issue_at(&self, subject: i64, now: DateTime<Utc>) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::Signing("token expiry out of range".to_string()))?;
        let claims = Claims {
            sub: subject,
            exp: expires.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header = serde_json::to_vec(&header).map_err(|e| TokenError::Signing(e.to_string()))?;
        let claims = serde_json::to_vec(&claims).map_err(|e| TokenError::Signing(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            BASE64URL_NOPAD.encode(&header),
            BASE64URL_NOPAD.encode(&claims)
        );
        let signature = self.mac(&signing_input)?.finalize().into_bytes();

        Ok(format!("{}.{}", signing_input, BASE64URL_NOPAD.encode(&signature)))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token against the given clock.
    ///
    /// The header algorithm is checked before the signature so a token signed
    /// with another scheme reports `WrongAlgorithm` rather than a bad signature.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => return Err(TokenError::Malformed("expected three segments".into())),
            };

        let header: Header = decode_segment(header_b64, "header")?;
        if header.alg != ALGORITHM {
            return Err(TokenError::WrongAlgorithm(header.alg));
        }

        let signature = BASE64URL_NOPAD
            .decode(signature_b64.as_bytes())
            .map_err(|_| TokenError::Malformed("signature is not base64url".into()))?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        self.mac(signing_input)?
            .verify_slice(&signature)
            .map_err(|_| TokenError::Malformed("signature mismatch".into()))?;

        let claims: Claims = decode_segment(claims_b64, "claims")?;
        if now.timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, signing_input: &str) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> Result<T, TokenError> {
    let bytes = BASE64URL_NOPAD
        .decode(segment.as_bytes())
        .map_err(|_| TokenError::Malformed(format!("{} is not base64url", what)))?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed(format!("{} is not valid JSON", what)))
}
