//! HTTP handlers. Each handler receives the verified caller as an
//! `Extension<AuthUser>` inserted by the access middleware of its route group.

pub mod annotation;
pub mod annotation_type;
pub mod document;
pub mod user;

use serde::Deserialize;
use uuid::Uuid;

/// `?id=<uuid>` query used by most lookup routes
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Uuid,
}
