use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role rank. Declaration order is the authorization order: `User < Controller < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Controller,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Controller, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Controller => "controller",
            Role::Admin => "admin",
        }
    }

    /// True when this role ranks at least as high as `floor`.
    pub fn satisfies(&self, floor: Role) -> bool {
        *self >= floor
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "controller" => Ok(Role::Controller),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub handle: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub group: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(handle: impl Into<String>, password_hash: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            handle: handle.into(),
            password_hash: password_hash.into(),
            role,
            name: None,
            surname: None,
            group: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Optional profile fields supplied at sign-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub group: Option<String>,
}
