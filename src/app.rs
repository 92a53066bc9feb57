//! Application wiring: shared state, route table and global layers.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::access::AccessChain;
use crate::auth::{AuthService, PasswordHasher, TokenService};
use crate::config::{AppConfig, Environment};
use crate::database::models::Role;
use crate::database::{
    AnnotationRepository, AnnotationTypeRepository, DatabaseManager, DocumentRepository, MemoryDatabase,
    PgDatabase, ReportRepository, UserRepository,
};
use crate::detection::DetectionModel;
use crate::handlers::{annotation, annotation_type, document, user};
use crate::middleware::access_middleware;
use crate::pipeline::{JsonReportRenderer, ReportCreator};
use crate::services::{AnnotationService, AnnotationTypeService, DocumentService};
use crate::storage::ContentStorage;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub documents: Arc<DocumentService>,
    pub annotation_types: Arc<AnnotationTypeService>,
    pub annotations: Arc<AnnotationService>,
    /// `None` when running on in-memory repositories
    pub database: Option<PgPool>,
}

/// Everything the services are built from.
pub struct Components {
    pub users: Arc<dyn UserRepository>,
    pub annotation_types: Arc<dyn AnnotationTypeRepository>,
    pub annotations: Arc<dyn AnnotationRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub document_store: Arc<dyn ContentStorage>,
    pub report_store: Arc<dyn ContentStorage>,
    pub detector: Arc<dyn DetectionModel>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub database: Option<PgPool>,
}

impl Components {
    /// Metadata in a [`MemoryDatabase`]; content stores are supplied by the caller.
    pub fn in_memory(
        document_store: Arc<dyn ContentStorage>,
        report_store: Arc<dyn ContentStorage>,
        detector: Arc<dyn DetectionModel>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let db = Arc::new(MemoryDatabase::new());
        Self {
            users: db.clone(),
            annotation_types: db.clone(),
            annotations: db.clone(),
            documents: db.clone(),
            reports: db,
            document_store,
            report_store,
            detector,
            hasher,
            database: None,
        }
    }

    /// Metadata in PostgreSQL.
    pub fn postgres(
        pool: PgPool,
        document_store: Arc<dyn ContentStorage>,
        report_store: Arc<dyn ContentStorage>,
        detector: Arc<dyn DetectionModel>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let db = Arc::new(PgDatabase::new(pool.clone()));
        Self {
            users: db.clone(),
            annotation_types: db.clone(),
            annotations: db.clone(),
            documents: db.clone(),
            reports: db,
            document_store,
            report_store,
            detector,
            hasher,
            database: Some(pool),
        }
    }
}

impl AppState {
    pub fn assemble(components: Components, tokens: TokenService, config: &AppConfig) -> Self {
        let creator = ReportCreator::new(
            components.detector,
            components.annotation_types.clone(),
            Arc::new(JsonReportRenderer::default()),
            config.pipeline.strict_types,
        );
        let documents = DocumentService::new(
            components.documents.clone(),
            components.reports,
            components.document_store,
            components.report_store,
            creator,
        )
        .with_max_document_bytes(config.storage.max_document_bytes)
        .serialize_per_document(config.pipeline.serialize_per_document);

        Self {
            auth: Arc::new(AuthService::new(
                components.users,
                components.hasher,
                tokens,
                config.security.min_password_length,
            )),
            documents: Arc::new(documents),
            annotation_types: Arc::new(AnnotationTypeService::new(components.annotation_types.clone())),
            annotations: Arc::new(AnnotationService::new(
                components.annotations,
                components.annotation_types,
                components.documents,
            )),
            database: components.database,
        }
    }
}

/// Route gates shared by every group requiring the same rank.
struct Gates {
    user: Arc<AccessChain>,
    controller: Arc<AccessChain>,
    admin: Arc<AccessChain>,
}

impl Gates {
    fn new(tokens: &TokenService) -> Self {
        let gate = |role| Arc::new(AccessChain::authenticated(tokens.clone()).require(role));
        Self {
            user: gate(Role::User),
            controller: gate(Role::Controller),
            admin: gate(Role::Admin),
        }
    }
}

pub fn router(state: AppState, config: &AppConfig) -> Router {
    let gates = Gates::new(state.auth.tokens());

    let public = Router::new()
        .route("/health", get(health))
        .route("/user/SignUp", post(user::sign_up))
        .route("/user/SignIn", post(user::sign_in));

    let documents = Router::new()
        .route(
            "/document/upload",
            post(document::upload).layer(DefaultBodyLimit::max(config.storage.max_document_bytes)),
        )
        .route("/document/report", post(document::create_report))
        .route("/document/getDocument", get(document::get_document))
        .route("/document/getReport", get(document::get_report))
        .route("/document/getReports", get(document::list_reports))
        .route("/document/getDocumentsMeta", get(document::list_documents))
        .route("/document/rename", put(document::rename))
        .route("/user/me", get(user::whoami))
        .route_layer(from_fn_with_state(gates.user, access_middleware));

    let curation = Router::new()
        .route("/annotType/add", post(annotation_type::add))
        .route("/annotType/get", get(annotation_type::get))
        .route("/annotType/creatorID", get(annotation_type::list_by_creator))
        .route("/annotType/gets", get(annotation_type::get_many))
        .route("/annotType/getsAll", get(annotation_type::list_all))
        .route("/annot/add", post(annotation::add))
        .route("/annot/get", get(annotation::get))
        .route("/annot/creatorID", get(annotation::list_by_creator))
        .route("/annot/documentID", get(annotation::list_by_document))
        .route("/annot/delete", delete(annotation::delete))
        .route("/annot/getsAll", get(annotation::list_all))
        .route_layer(from_fn_with_state(gates.controller, access_middleware));

    let admin = Router::new()
        .route("/annotType/delete", delete(annotation_type::delete))
        .route("/user/role", post(user::change_role))
        .route("/user/getUsers", get(user::list_users))
        .route_layer(from_fn_with_state(gates.admin, access_middleware));

    let mut app = Router::new()
        .merge(public)
        .merge(documents)
        .merge(curation)
        .merge(admin)
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs)))
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(config) {
        app = app.layer(cors);
    }

    app.with_state(state)
}

fn cors_layer(config: &AppConfig) -> Option<CorsLayer> {
    if !config.security.enable_cors {
        return None;
    }
    if config.environment == Environment::Development && config.security.cors_origins.is_empty() {
        return Some(CorsLayer::permissive());
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(Any),
    )
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    let Some(pool) = state.database.as_ref() else {
        return (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "memory" }
            })),
        );
    };

    match DatabaseManager::health_check(pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": true,
                    "message": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": { "status": "degraded", "timestamp": now }
                })),
            )
        }
    }
}
