pub mod password;
pub mod service;

pub use password::{Argon2Hasher, PasswordHasher};
pub use service::{AuthError, AuthService, SignUpRequest};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{Role, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub handle: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Verified caller identity attached to each authorized request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub handle: String,
    pub role: Role,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            handle: claims.handle,
            role: claims.role,
        }
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            handle: user.handle.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token is malformed")]
    Malformed,

    #[error("token claims are invalid")]
    InvalidClaims,

    #[error("token generation failed: {0}")]
    Generation(String),

    #[error("token secret is not configured")]
    InvalidSecret,
}

/// Issues and verifies HS256 session tokens.
///
/// One instance is shared by sign-in and the access chain so both use the
/// same key.
#[derive(Clone)]
pub struct TokenService {
    secret: Arc<Vec<u8>>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::InvalidSecret);
        }
        Ok(Self {
            secret: Arc::new(secret.to_vec()),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &AuthUser) -> Result<String, TokenError> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(&self, identity: &AuthUser, issued_at: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            sub: identity.user_id,
            handle: identity.handle.clone(),
            role: identity.role,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| TokenError::Generation(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let data = decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map_err(|e| {
                tracing::debug!("Token validation failed: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSignature => TokenError::BadSignature,
                    ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => TokenError::InvalidClaims,
                    _ => TokenError::Malformed,
                }
            })?;

        let claims = data.claims;
        if claims.iat > claims.exp || claims.handle.is_empty() {
            return Err(TokenError::InvalidClaims);
        }
        Ok(claims)
    }
}
