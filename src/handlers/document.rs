use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::IdQuery;
use crate::app::AppState;
use crate::auth::AuthUser;
use crate::database::models::{Document, Report};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub document_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub id: Uuid,
    pub name: String,
}

/// POST /document/upload?name=<file name>
///
/// The body is the raw document; its `Content-Type` header is recorded with it.
pub async fn upload(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Document> {
    let Query(query) = query?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let document = state
        .documents
        .upload_document(&actor, &query.name, content_type, &body)
        .await?;
    Ok(ApiResponse::created(document))
}

/// POST /document/report
///
/// Runs detection on the document and stores a new report.
///
/// Expected Input:
/// ```json
/// { "document_id": "uuid" }
/// ```
pub async fn create_report(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    payload: Result<Json<CreateReportRequest>, JsonRejection>,
) -> ApiResult<Report> {
    let Json(request) = payload?;
    let report = state.documents.create_report(&actor, request.document_id).await?;
    Ok(ApiResponse::created(report))
}

/// GET /document/getDocument?id= - raw document content
pub async fn get_document(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(IdQuery { id }) = query?;
    let (document, content) = state.documents.get_document(&actor, id).await?;
    Ok(binary(&document.content_type, Some(&document.name), id, content))
}

/// GET /document/getReport?id= - rendered report artifact
pub async fn get_report(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(IdQuery { id }) = query?;
    let (report, content) = state.documents.get_report(&actor, id).await?;
    Ok(binary(&report.content_type, None, report.document_id, content))
}

/// GET /document/getReports?id= - reports generated for a document
pub async fn list_reports(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Vec<Report>> {
    let Query(IdQuery { id }) = query?;
    Ok(ApiResponse::success(state.documents.list_reports(&actor, id).await?))
}

/// GET /document/getDocumentsMeta - the caller's own documents
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
) -> ApiResult<Vec<Document>> {
    Ok(ApiResponse::success(state.documents.list_documents(&actor).await?))
}

/// PUT /document/rename
pub async fn rename(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<Document> {
    let Json(request) = payload?;
    let document = state
        .documents
        .rename_document(&actor, request.id, &request.name)
        .await?;
    Ok(ApiResponse::success(document))
}

fn binary(content_type: &str, file_name: Option<&str>, document_id: Uuid, content: Vec<u8>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type).unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(name) = file_name {
        // quotes and control characters cannot appear in a quoted filename
        let safe: String = name.chars().filter(|c| !c.is_control() && *c != '"').collect();
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe)) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&document_id.to_string()) {
        headers.insert("x-document-id", value);
    }
    (headers, content).into_response()
}
