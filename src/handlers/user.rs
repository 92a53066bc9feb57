use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{AuthUser, SignUpRequest};
use crate::database::models::{Role, User};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub token: String,
    pub user: IdentityView,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct IdentityView {
    pub id: Uuid,
    pub handle: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub user_id: Uuid,
    pub role: Role,
}

/// POST /user/SignUp
///
/// Expected Input:
/// ```json
/// { "handle": "alice", "password": "wonderland-42", "name": "Alice", "group": "legal" }
/// ```
///
/// Responds 201 with the created user (never the password hash).
pub async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> ApiResult<User> {
    let Json(request) = payload?;
    let user = state.auth.sign_up(request).await?;
    Ok(ApiResponse::created(user))
}

/// POST /user/SignIn
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "token": "eyJhbGciOiJIUzI1NiI...",
///     "user": { "id": "uuid", "handle": "alice", "role": "user" },
///     "expires_in": 604800
///   }
/// }
/// ```
pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> ApiResult<SessionView> {
    let Json(request) = payload?;
    let session = state.auth.sign_in(&request.handle, &request.password).await?;
    Ok(ApiResponse::success(SessionView {
        token: session.token,
        user: IdentityView {
            id: session.user.user_id,
            handle: session.user.handle,
            role: session.user.role,
        },
        expires_in: session.expires_in,
    }))
}

/// POST /user/role - Admin only
pub async fn change_role(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    payload: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(request) = payload?;
    state.auth.change_role(&actor, request.user_id, request.role).await?;
    Ok(ApiResponse::no_content())
}

/// GET /user/getUsers - Admin only
pub async fn list_users(State(state): State<AppState>, Extension(actor): Extension<AuthUser>) -> ApiResult<Vec<User>> {
    Ok(ApiResponse::success(state.auth.list_users(&actor).await?))
}

/// GET /user/me
pub async fn whoami(Extension(actor): Extension<AuthUser>) -> ApiResult<IdentityView> {
    Ok(ApiResponse::success(IdentityView {
        id: actor.user_id,
        handle: actor.handle,
        role: actor.role,
    }))
}
