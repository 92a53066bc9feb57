use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::IdQuery;
use crate::app::AppState;
use crate::auth::AuthUser;
use crate::database::models::AnnotationType;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::NewAnnotationType;

/// `?ids=<uuid>,<uuid>,...`
#[derive(Debug, Deserialize)]
pub struct IdsQuery {
    pub ids: String,
}

impl IdsQuery {
    fn parse(&self) -> Result<Vec<Uuid>, ApiError> {
        self.ids
            .split(',')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("invalid id '{}'", raw))))
            .collect()
    }
}

/// POST /annotType/add
///
/// Expected Input:
/// ```json
/// { "label": "signature", "description": "Handwritten signature", "access": "shared" }
/// ```
pub async fn add(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    payload: Result<Json<NewAnnotationType>, JsonRejection>,
) -> ApiResult<AnnotationType> {
    let Json(request) = payload?;
    Ok(ApiResponse::created(state.annotation_types.add(&actor, request).await?))
}

/// GET /annotType/get?id=
pub async fn get(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<AnnotationType> {
    let Query(IdQuery { id }) = query?;
    Ok(ApiResponse::success(state.annotation_types.get(id).await?))
}

/// GET /annotType/creatorID?id= - types registered by one user
pub async fn list_by_creator(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Vec<AnnotationType>> {
    let Query(IdQuery { id }) = query?;
    Ok(ApiResponse::success(state.annotation_types.list_by_creator(id).await?))
}

/// GET /annotType/gets?ids= - batch lookup; unknown ids are skipped
pub async fn get_many(
    State(state): State<AppState>,
    query: Result<Query<IdsQuery>, QueryRejection>,
) -> ApiResult<Vec<AnnotationType>> {
    let Query(query) = query?;
    let ids = query.parse()?;
    Ok(ApiResponse::success(state.annotation_types.get_many(&ids).await?))
}

/// GET /annotType/getsAll
pub async fn list_all(State(state): State<AppState>) -> ApiResult<Vec<AnnotationType>> {
    Ok(ApiResponse::success(state.annotation_types.list_all().await?))
}

/// DELETE /annotType/delete?id= - Admin only
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<()> {
    let Query(IdQuery { id }) = query?;
    state.annotation_types.delete(&actor, id).await?;
    Ok(ApiResponse::no_content())
}
