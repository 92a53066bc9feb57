use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::database::models::{Annotation, AnnotationType, Creator, Payload, Region, Role, TypeAccess};
use crate::database::{AnnotationRepository, AnnotationTypeRepository, DatabaseError, DocumentRepository};

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Repository(DatabaseError),
}

impl From<DatabaseError> for AnnotationError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(what) => AnnotationError::NotFound(what),
            DatabaseError::Duplicate(what) | DatabaseError::Conflict(what) => AnnotationError::Conflict(what),
            other => AnnotationError::Repository(other),
        }
    }
}

fn require(actor: &AuthUser, floor: Role, action: &str) -> Result<(), AnnotationError> {
    if actor.role.satisfies(floor) {
        Ok(())
    } else {
        warn!("User {} ({}) attempted to {}", actor.handle, actor.role, action);
        Err(AnnotationError::Forbidden(format!("{} requires {} role", action, floor)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAnnotationType {
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub access: TypeAccess,
}

/// Registry of annotation types.
pub struct AnnotationTypeService {
    types: Arc<dyn AnnotationTypeRepository>,
}

impl AnnotationTypeService {
    pub fn new(types: Arc<dyn AnnotationTypeRepository>) -> Self {
        Self { types }
    }

    pub async fn add(&self, actor: &AuthUser, request: NewAnnotationType) -> Result<AnnotationType, AnnotationError> {
        require(actor, Role::Controller, "create annotation types")?;
        let label = request.label.trim();
        if label.is_empty() || label.len() > 128 {
            return Err(AnnotationError::InvalidInput(
                "label must be between 1 and 128 characters".to_string(),
            ));
        }

        let annotation_type = AnnotationType::new(actor.user_id, label, request.description.trim(), request.access);
        self.types.insert(&annotation_type).await?;
        info!(
            "User {} registered annotation type '{}' ({})",
            actor.handle, annotation_type.label, annotation_type.id
        );
        Ok(annotation_type)
    }

    pub async fn get(&self, id: Uuid) -> Result<AnnotationType, AnnotationError> {
        Ok(self.types.get(id).await?)
    }

    pub async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<AnnotationType>, AnnotationError> {
        Ok(self.types.get_many(ids).await?)
    }

    pub async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<AnnotationType>, AnnotationError> {
        Ok(self.types.list_by_creator(creator_id).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<AnnotationType>, AnnotationError> {
        Ok(self.types.list_all().await?)
    }

    /// Admin only. Types still referenced by annotations are kept (`Conflict`).
    pub async fn delete(&self, actor: &AuthUser, id: Uuid) -> Result<(), AnnotationError> {
        require(actor, Role::Admin, "delete annotation types")?;
        self.types.delete(id).await?;
        info!("User {} deleted annotation type {}", actor.handle, id);
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAnnotation {
    pub document_id: Uuid,
    pub type_id: Uuid,
    pub region: Region,
}

/// Manually authored annotations.
pub struct AnnotationService {
    annotations: Arc<dyn AnnotationRepository>,
    types: Arc<dyn AnnotationTypeRepository>,
    documents: Arc<dyn DocumentRepository>,
}

impl AnnotationService {
    pub fn new(
        annotations: Arc<dyn AnnotationRepository>,
        types: Arc<dyn AnnotationTypeRepository>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            annotations,
            types,
            documents,
        }
    }

    pub async fn add(&self, actor: &AuthUser, request: NewAnnotation) -> Result<Annotation, AnnotationError> {
        require(actor, Role::Controller, "create annotations")?;

        let annotation_type = self.types.get(request.type_id).await?;
        let usable = annotation_type.access == TypeAccess::Shared
            || annotation_type.creator_id == actor.user_id
            || actor.role == Role::Admin;
        if !usable {
            return Err(AnnotationError::Forbidden(format!(
                "annotation type '{}' is restricted to its creator",
                annotation_type.label
            )));
        }

        let document = self.documents.get(request.document_id).await?;
        if !request.region.fits_within(document.page_count) {
            return Err(AnnotationError::InvalidInput(format!(
                "region {} lies outside document {} ({} pages)",
                request.region, document.id, document.page_count
            )));
        }

        let annotation = Annotation {
            id: Uuid::new_v4(),
            document_id: document.id,
            type_id: annotation_type.id,
            creator: Creator::User(actor.user_id),
            region: request.region,
            payload: Payload::Manual,
            created_at: Utc::now(),
        };
        self.annotations.insert(&annotation).await?;
        info!(
            "User {} annotated document {} with '{}' at {}",
            actor.handle, document.id, annotation_type.label, annotation.region
        );
        Ok(annotation)
    }

    pub async fn get(&self, id: Uuid) -> Result<Annotation, AnnotationError> {
        Ok(self.annotations.get(id).await?)
    }

    pub async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<Annotation>, AnnotationError> {
        Ok(self.annotations.list_by_creator(creator_id).await?)
    }

    pub async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<Annotation>, AnnotationError> {
        Ok(self.annotations.list_by_document(document_id).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<Annotation>, AnnotationError> {
        Ok(self.annotations.list_all().await?)
    }

    pub async fn delete(&self, actor: &AuthUser, id: Uuid) -> Result<(), AnnotationError> {
        require(actor, Role::Controller, "delete annotations")?;
        self.annotations.delete(id).await?;
        info!("User {} deleted annotation {}", actor.handle, id);
        Ok(())
    }
}
