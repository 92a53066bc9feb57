use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::password::{HashError, PasswordHasher};
use super::{AuthUser, TokenError, TokenService};
use crate::database::models::{Role, User, UserProfile};
use crate::database::{DatabaseError, UserRepository};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("handle '{0}' is already taken")]
    DuplicateHandle(String),

    #[error("weak credential: {0}")]
    WeakCredential(String),

    /// Deliberately silent about which half of the credential was wrong
    #[error("invalid handle or password")]
    InvalidCredential,

    #[error("user not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for AuthError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(what) => AuthError::NotFound(what),
            other => AuthError::Database(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub handle: String,
    pub password: String,
    #[serde(flatten)]
    pub profile: UserProfile,
}

impl SignUpRequest {
    pub fn new(handle: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            password: password.into(),
            profile: UserProfile::default(),
        }
    }
}

/// Token issued by a successful sign-in
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: AuthUser,
    pub expires_in: i64,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: TokenService,
    min_password_length: usize,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: TokenService,
        min_password_length: usize,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            min_password_length,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Registers a new account with the default `User` role.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<User, AuthError> {
        self.register(request, Role::User).await
    }

    async fn register(&self, request: SignUpRequest, role: Role) -> Result<User, AuthError> {
        let handle = request.handle.trim().to_string();
        validate_handle(&handle)?;
        validate_password(&handle, &request.password, self.min_password_length)?;

        let hash = self.hasher.hash(&request.password).await?;
        let mut user = User::new(handle, hash, role);
        user.name = request.profile.name;
        user.surname = request.profile.surname;
        user.group = request.profile.group;

        match self.users.insert(&user).await {
            Ok(()) => {}
            Err(DatabaseError::Duplicate(_)) => return Err(AuthError::DuplicateHandle(user.handle)),
            Err(e) => return Err(e.into()),
        }

        info!("Registered user '{}' ({}) with role {}", user.handle, user.id, user.role);
        Ok(user)
    }

    pub async fn sign_in(&self, handle: &str, password: &str) -> Result<Session, AuthError> {
        let user = match self.users.find_by_handle(handle.trim()).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => {
                // same hashing work as a wrong password
                let _ = self.hasher.verify(password, self.hasher.decoy_hash()).await?;
                warn!("Sign-in failed for unknown handle");
                return Err(AuthError::InvalidCredential);
            }
            Err(e) => return Err(e.into()),
        };

        if !self.hasher.verify(password, &user.password_hash).await? {
            warn!("Sign-in failed for user {}", user.id);
            return Err(AuthError::InvalidCredential);
        }

        let identity = AuthUser::from(&user);
        let token = self.tokens.issue(&identity)?;
        Ok(Session {
            token,
            user: identity,
            expires_in: self.tokens.ttl().num_seconds(),
        })
    }

    /// Admin-only. The actor is the verified identity from the access chain.
    pub async fn change_role(&self, actor: &AuthUser, target: Uuid, role: Role) -> Result<(), AuthError> {
        if actor.role != Role::Admin {
            warn!("User {} ({}) attempted to change role of {}", actor.handle, actor.role, target);
            return Err(AuthError::Forbidden("only admins may change roles".to_string()));
        }

        self.users.update_role(target, role).await?;
        info!("User {} set role of {} to {}", actor.handle, target, role);
        Ok(())
    }

    pub async fn list_users(&self, actor: &AuthUser) -> Result<Vec<User>, AuthError> {
        if actor.role != Role::Admin {
            return Err(AuthError::Forbidden("only admins may list users".to_string()));
        }
        Ok(self.users.list_all().await?)
    }

    /// Creates the configured admin account if its handle is free. Idempotent.
    pub async fn ensure_admin(&self, handle: &str, password: &str) -> Result<User, AuthError> {
        match self.users.find_by_handle(handle).await {
            Ok(existing) => {
                if existing.role != Role::Admin {
                    warn!("Bootstrap admin '{}' exists with role {}", handle, existing.role);
                }
                Ok(existing)
            }
            Err(DatabaseError::NotFound(_)) => {
                let user = self.register(SignUpRequest::new(handle, password), Role::Admin).await?;
                info!("Created bootstrap admin '{}'", user.handle);
                Ok(user)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_handle(handle: &str) -> Result<(), AuthError> {
    if handle.len() < 3 || handle.len() > 64 {
        return Err(AuthError::WeakCredential(
            "handle must be between 3 and 64 characters".to_string(),
        ));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AuthError::WeakCredential(
            "handle can only contain letters, numbers, '_', '-' and '.'".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(handle: &str, password: &str, min_length: usize) -> Result<(), AuthError> {
    if password.chars().count() < min_length {
        return Err(AuthError::WeakCredential(format!(
            "password must be at least {} characters",
            min_length
        )));
    }
    if password.eq_ignore_ascii_case(handle) {
        return Err(AuthError::WeakCredential(
            "password must differ from the handle".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Argon2Hasher;
    use crate::database::MemoryDatabase;
    use chrono::Duration;

    fn service() -> AuthService {
        let tokens = TokenService::new("unit-test-secret", Duration::hours(1)).unwrap();
        AuthService::new(
            Arc::new(MemoryDatabase::new()),
            Arc::new(Argon2Hasher::with_params(1024, 1, 1).unwrap()),
            tokens,
            8,
        )
    }

    #[tokio::test]
    async fn sign_in_after_sign_up_issues_user_token() {
        let auth = service();
        let user = auth
            .sign_up(SignUpRequest::new("alice", "wonderland-42"))
            .await
            .unwrap();
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "wonderland-42");

        let session = auth.sign_in("alice", "wonderland-42").await.unwrap();
        let claims = auth.tokens().verify(&session.token).unwrap();
        assert_eq!(claims.handle, "alice");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn duplicate_handle_is_reported() {
        let auth = service();
        auth.sign_up(SignUpRequest::new("alice", "wonderland-42")).await.unwrap();
        let err = auth
            .sign_up(SignUpRequest::new("alice", "another-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateHandle(h) if h == "alice"));
    }

    #[tokio::test]
    async fn weak_credentials_are_rejected() {
        let auth = service();
        for (handle, password) in [("al", "long-enough-1"), ("bob", "short"), ("carol", "CAROL"), ("d@ve", "long-enough-1")] {
            let err = auth.sign_up(SignUpRequest::new(handle, password)).await.unwrap_err();
            assert!(matches!(err, AuthError::WeakCredential(_)), "{} / {}", handle, password);
        }
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_handle_look_the_same() {
        let auth = service();
        auth.sign_up(SignUpRequest::new("alice", "wonderland-42")).await.unwrap();

        let wrong = auth.sign_in("alice", "not-the-password").await.unwrap_err();
        let unknown = auth.sign_in("mallory", "wonderland-42").await.unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(wrong, AuthError::InvalidCredential));
        assert!(matches!(unknown, AuthError::InvalidCredential));
    }

    #[tokio::test]
    async fn only_admins_change_roles() {
        let auth = service();
        let target = auth.sign_up(SignUpRequest::new("alice", "wonderland-42")).await.unwrap();
        let controller = AuthUser {
            user_id: Uuid::new_v4(),
            handle: "ctl".to_string(),
            role: Role::Controller,
        };
        let err = auth.change_role(&controller, target.id, Role::Admin).await.unwrap_err();
        assert!(matches!(err, AuthError::Forbidden(_)));

        let admin = AuthUser { role: Role::Admin, ..controller };
        auth.change_role(&admin, target.id, Role::Controller).await.unwrap();
        let session = auth.sign_in("alice", "wonderland-42").await.unwrap();
        assert_eq!(session.user.role, Role::Controller);

        let err = auth.change_role(&admin, Uuid::new_v4(), Role::User).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent() {
        let auth = service();
        let first = auth.ensure_admin("admin", "admin-password").await.unwrap();
        let second = auth.ensure_admin("admin", "admin-password").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.role, Role::Admin);
    }
}
