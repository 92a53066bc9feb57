use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Extension, Json,
};

use super::IdQuery;
use crate::app::AppState;
use crate::auth::AuthUser;
use crate::database::models::Annotation;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::NewAnnotation;

/// POST /annot/add - manual annotation stamped with the caller as creator
///
/// Expected Input:
/// ```json
/// {
///   "document_id": "uuid",
///   "type_id": "uuid",
///   "region": { "page": 0, "x": 0.1, "y": 0.2, "width": 0.3, "height": 0.05 }
/// }
/// ```
pub async fn add(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    payload: Result<Json<NewAnnotation>, JsonRejection>,
) -> ApiResult<Annotation> {
    let Json(request) = payload?;
    Ok(ApiResponse::created(state.annotations.add(&actor, request).await?))
}

/// GET /annot/get?id=
pub async fn get(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Annotation> {
    let Query(IdQuery { id }) = query?;
    Ok(ApiResponse::success(state.annotations.get(id).await?))
}

/// GET /annot/creatorID?id=
pub async fn list_by_creator(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Vec<Annotation>> {
    let Query(IdQuery { id }) = query?;
    Ok(ApiResponse::success(state.annotations.list_by_creator(id).await?))
}

/// GET /annot/documentID?id=
pub async fn list_by_document(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Vec<Annotation>> {
    let Query(IdQuery { id }) = query?;
    Ok(ApiResponse::success(state.annotations.list_by_document(id).await?))
}

/// GET /annot/getsAll
pub async fn list_all(State(state): State<AppState>) -> ApiResult<Vec<Annotation>> {
    Ok(ApiResponse::success(state.annotations.list_all().await?))
}

/// DELETE /annot/delete?id=
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<()> {
    let Query(IdQuery { id }) = query?;
    state.annotations.delete(&actor, id).await?;
    Ok(ApiResponse::no_content())
}
