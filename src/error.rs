// HTTP API Error Types
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::access::{Rejection, Verdict};
use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::detection::DetectionError;
use crate::pipeline::PipelineFailure;
use crate::services::{AnnotationError, DocumentError};
use crate::storage::StorageError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (detection model failures)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),

    // 504 Gateway Timeout
    GatewayTimeout(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::GatewayTimeout(_) => 504,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::BadGateway(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
            ApiError::GatewayTimeout(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        ApiError::GatewayTimeout(message.into())
    }
}

// Convert other error types to ApiError
impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Duplicate(msg) | DatabaseError::Conflict(msg) => ApiError::conflict(msg),
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Database misconfigured: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::QueryError(msg) => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Database query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        match rejection.verdict() {
            Verdict::Unauthorized => ApiError::unauthorized(rejection.to_string()),
            Verdict::Forbidden => ApiError::forbidden(rejection.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::DuplicateHandle(_) => ApiError::conflict(err.to_string()),
            AuthError::WeakCredential(msg) => ApiError::validation_error(msg, None),
            AuthError::InvalidCredential => ApiError::unauthorized(err.to_string()),
            AuthError::NotFound(msg) => ApiError::not_found(msg),
            AuthError::Forbidden(msg) => ApiError::forbidden(msg),
            AuthError::Token(e) => {
                tracing::error!("Token issuance failed: {}", e);
                ApiError::internal_server_error("Failed to issue session token")
            }
            AuthError::Hash(e) => {
                tracing::error!("Password hashing failed: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            AuthError::Database(e) => e.into(),
        }
    }
}

impl From<AnnotationError> for ApiError {
    fn from(err: AnnotationError) -> Self {
        match err {
            AnnotationError::NotFound(msg) => ApiError::not_found(msg),
            AnnotationError::Forbidden(msg) => ApiError::forbidden(msg),
            AnnotationError::InvalidInput(msg) => ApiError::bad_request(msg),
            AnnotationError::Conflict(msg) => ApiError::conflict(msg),
            AnnotationError::Repository(e) => e.into(),
        }
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound(msg) => ApiError::not_found(msg),
            DocumentError::Forbidden(msg) => ApiError::forbidden(msg),
            DocumentError::InvalidInput(msg) => ApiError::bad_request(msg),
            DocumentError::Pipeline { source, .. } => source.into(),
            DocumentError::Storage(e) => e.into(),
            DocumentError::Repository(e) => e.into(),
        }
    }
}

/// Pipeline failures never leak model or storage detail to the client.
impl From<PipelineFailure> for ApiError {
    fn from(err: PipelineFailure) -> Self {
        match err {
            PipelineFailure::Detection(DetectionError::ModelTimeout(_)) => {
                ApiError::gateway_timeout("Report generation failed: detection model timed out")
            }
            PipelineFailure::Detection(DetectionError::ModelUnavailable(_)) => {
                ApiError::bad_gateway("Report generation failed: detection model unavailable")
            }
            PipelineFailure::Detection(DetectionError::InvalidInput(_)) => {
                ApiError::bad_request("Report generation failed: document rejected by detection model")
            }
            PipelineFailure::Resolve(e) => {
                tracing::error!("Annotation type resolution failed: {}", e);
                ApiError::internal_server_error("Report generation failed")
            }
            PipelineFailure::Render(e) => {
                tracing::error!("Report rendering failed: {}", e);
                ApiError::internal_server_error("Report generation failed")
            }
            PipelineFailure::Storage(e) => {
                tracing::error!("Report storage failed: {}", e);
                ApiError::internal_server_error("Report generation failed")
            }
            PipelineFailure::Repository(e) => {
                tracing::error!("Report persistence failed: {}", e);
                ApiError::internal_server_error("Report generation failed")
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!("Content storage error: {}", err);
        ApiError::internal_server_error("Failed to read stored content")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_json(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenError;
    use uuid::Uuid;

    #[test]
    fn access_rejections_map_to_401_and_403() {
        assert_eq!(ApiError::from(Rejection::MissingToken).status_code(), 401);
        assert_eq!(
            ApiError::from(Rejection::InvalidToken(TokenError::Expired)).status_code(),
            401
        );
        assert_eq!(
            ApiError::from(Rejection::InsufficientRole {
                required: crate::database::models::Role::Admin,
                actual: crate::database::models::Role::User,
            })
            .status_code(),
            403
        );
    }

    #[test]
    fn pipeline_failures_hide_internals() {
        let err = ApiError::from(DocumentError::Pipeline {
            document_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            source: PipelineFailure::Detection(DetectionError::ModelUnavailable(
                "http://10.0.0.3:5000 refused".to_string(),
            )),
        });
        assert_eq!(err.status_code(), 502);
        assert!(!err.message().contains("10.0.0.3"));

        let timeout = ApiError::from(PipelineFailure::Detection(DetectionError::ModelTimeout(60)));
        assert_eq!(timeout.status_code(), 504);
        assert_eq!(timeout.to_json()["code"], "GATEWAY_TIMEOUT");
    }

    #[test]
    fn auth_errors_map_to_client_statuses() {
        assert_eq!(ApiError::from(AuthError::InvalidCredential).status_code(), 401);
        assert_eq!(ApiError::from(AuthError::DuplicateHandle("a".into())).status_code(), 409);
        assert_eq!(
            ApiError::from(AuthError::WeakCredential("short".into())).to_json()["code"],
            "VALIDATION_ERROR"
        );
    }
}
