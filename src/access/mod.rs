//! Per-request authorization gate.
//!
//! A chain always starts with token authentication; any number of further
//! stages (role floors, custom checks) run afterwards against the verified
//! identity. Evaluation walks `Unauthenticated -> Authenticated -> Authorized`
//! and stops at the first rejecting stage.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{AuthUser, TokenError, TokenService};
use crate::database::models::Role;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing bearer token")]
    MissingToken,

    #[error("{0}")]
    InvalidToken(#[from] TokenError),

    #[error("requires {required} role, caller is {actual}")]
    InsufficientRole { required: Role, actual: Role },

    #[error("{0}")]
    Denied(String),
}

impl Rejection {
    pub fn verdict(&self) -> Verdict {
        match self {
            Rejection::MissingToken | Rejection::InvalidToken(_) => Verdict::Unauthorized,
            Rejection::InsufficientRole { .. } | Rejection::Denied(_) => Verdict::Forbidden,
        }
    }
}

/// Transport-neutral outcome class of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Unauthorized,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessState {
    Unauthenticated,
    Authenticated(AuthUser),
    Authorized(AuthUser),
    Rejected(Rejection),
}

/// A check that runs after authentication
pub trait AccessStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, user: &AuthUser) -> Result<(), Rejection>;
}

/// Rejects callers ranked below `min`
#[derive(Debug, Clone, Copy)]
pub struct RoleFloor {
    pub min: Role,
}

impl AccessStage for RoleFloor {
    fn name(&self) -> &'static str {
        "role_floor"
    }

    fn check(&self, user: &AuthUser) -> Result<(), Rejection> {
        if user.role.satisfies(self.min) {
            Ok(())
        } else {
            Err(Rejection::InsufficientRole {
                required: self.min,
                actual: user.role,
            })
        }
    }
}

#[derive(Clone)]
pub struct AccessChain {
    tokens: TokenService,
    stages: Vec<Arc<dyn AccessStage>>,
}

impl fmt::Debug for AccessChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("AccessChain").field("stages", &names).finish()
    }
}

impl AccessChain {
    /// Authentication only; any valid token passes.
    pub fn authenticated(tokens: TokenService) -> Self {
        Self {
            tokens,
            stages: Vec::new(),
        }
    }

    pub fn require(self, min: Role) -> Self {
        self.with_stage(RoleFloor { min })
    }

    pub fn with_stage(mut self, stage: impl AccessStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Runs the state machine to its terminal state.
    pub fn evaluate(&self, credential: Option<&str>) -> AccessState {
        let mut state = AccessState::Unauthenticated;
        loop {
            state = match state {
                AccessState::Unauthenticated => match self.authenticate(credential) {
                    Ok(user) => AccessState::Authenticated(user),
                    Err(rejection) => AccessState::Rejected(rejection),
                },
                AccessState::Authenticated(user) => {
                    match self.stages.iter().try_for_each(|stage| stage.check(&user)) {
                        Ok(()) => AccessState::Authorized(user),
                        Err(rejection) => AccessState::Rejected(rejection),
                    }
                }
                terminal => return terminal,
            };
        }
    }

    pub fn authorize(&self, credential: Option<&str>) -> Result<AuthUser, Rejection> {
        match self.evaluate(credential) {
            AccessState::Authorized(user) => Ok(user),
            AccessState::Rejected(rejection) => Err(rejection),
            // evaluate only returns terminal states
            other => Err(Rejection::Denied(format!("incomplete access evaluation: {:?}", other))),
        }
    }

    fn authenticate(&self, credential: Option<&str>) -> Result<AuthUser, Rejection> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(Rejection::MissingToken)?;
        let claims = self.tokens.verify(token)?;
        Ok(AuthUser::from(claims))
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, Rejection> {
    let value = header.ok_or(Rejection::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or(Rejection::InvalidToken(TokenError::Malformed))?
        .trim();
    if token.is_empty() {
        return Err(Rejection::MissingToken);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn tokens() -> TokenService {
        TokenService::new("access-chain-test-secret", Duration::hours(1)).unwrap()
    }

    fn token_for(tokens: &TokenService, role: Role) -> String {
        tokens
            .issue(&AuthUser {
                user_id: Uuid::new_v4(),
                handle: format!("{}-user", role),
                role,
            })
            .unwrap()
    }

    #[test]
    fn lower_roles_fail_higher_floors() {
        let tokens = tokens();
        for actual in Role::ALL {
            for required in Role::ALL {
                let chain = AccessChain::authenticated(tokens.clone()).require(required);
                let result = chain.authorize(Some(&token_for(&tokens, actual)));
                if actual >= required {
                    assert_eq!(result.unwrap().role, actual);
                } else {
                    let rejection = result.unwrap_err();
                    assert_eq!(rejection, Rejection::InsufficientRole { required, actual });
                    assert_eq!(rejection.verdict(), Verdict::Forbidden);
                }
            }
        }
    }

    #[test]
    fn expired_admin_token_is_unauthorized() {
        let tokens = tokens();
        let token = tokens
            .issue_at(
                &AuthUser {
                    user_id: Uuid::new_v4(),
                    handle: "root".to_string(),
                    role: Role::Admin,
                },
                Utc::now() - Duration::hours(3),
            )
            .unwrap();

        let state = AccessChain::authenticated(tokens).require(Role::User).evaluate(Some(&token));
        match state {
            AccessState::Rejected(rejection) => {
                assert_eq!(rejection, Rejection::InvalidToken(TokenError::Expired));
                assert_eq!(rejection.verdict(), Verdict::Unauthorized);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn missing_token_never_reaches_role_checks() {
        struct Panics;
        impl AccessStage for Panics {
            fn name(&self) -> &'static str {
                "panics"
            }
            fn check(&self, _: &AuthUser) -> Result<(), Rejection> {
                panic!("stage ran without authentication")
            }
        }

        let chain = AccessChain::authenticated(tokens()).with_stage(Panics);
        assert_eq!(chain.evaluate(None), AccessState::Rejected(Rejection::MissingToken));
    }

    #[test]
    fn custom_stages_run_in_order() {
        struct DenyHandle(&'static str);
        impl AccessStage for DenyHandle {
            fn name(&self) -> &'static str {
                "deny_handle"
            }
            fn check(&self, user: &AuthUser) -> Result<(), Rejection> {
                if user.handle == self.0 {
                    Err(Rejection::Denied("blocked".to_string()))
                } else {
                    Ok(())
                }
            }
        }

        let tokens = tokens();
        let chain = AccessChain::authenticated(tokens.clone())
            .require(Role::Controller)
            .with_stage(DenyHandle("admin-user"));

        // role floor rejects first
        assert!(matches!(
            chain.authorize(Some(&token_for(&tokens, Role::User))),
            Err(Rejection::InsufficientRole { .. })
        ));
        assert_eq!(
            chain.authorize(Some(&token_for(&tokens, Role::Admin))),
            Err(Rejection::Denied("blocked".to_string()))
        );
        assert!(chain.authorize(Some(&token_for(&tokens, Role::Controller))).is_ok());
    }

    #[test]
    fn parses_bearer_headers() {
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(None), Err(Rejection::MissingToken));
        assert_eq!(bearer_token(Some("Bearer   ")), Err(Rejection::MissingToken));
        assert_eq!(
            bearer_token(Some("Basic dXNlcjpwYXNz")),
            Err(Rejection::InvalidToken(TokenError::Malformed))
        );
    }
}
