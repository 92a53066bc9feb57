//! Storage contracts for metadata records.
//!
//! Authorization is the caller's job; repositories only enforce record-level
//! integrity (uniqueness, references).

use async_trait::async_trait;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{Annotation, AnnotationType, Document, Report, Role, User};

/// Credential store
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_handle(&self, handle: &str) -> Result<User, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<User, DatabaseError>;

    /// Fails with `Duplicate` when the handle is taken.
    async fn insert(&self, user: &User) -> Result<(), DatabaseError>;

    async fn update_role(&self, id: Uuid, role: Role) -> Result<(), DatabaseError>;

    async fn list_all(&self) -> Result<Vec<User>, DatabaseError>;
}

#[async_trait]
pub trait AnnotationTypeRepository: Send + Sync {
    /// Fails with `Duplicate` when the label is taken.
    async fn insert(&self, annotation_type: &AnnotationType) -> Result<(), DatabaseError>;

    async fn get(&self, id: Uuid) -> Result<AnnotationType, DatabaseError>;

    /// Unknown ids are skipped.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<AnnotationType>, DatabaseError>;

    async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<AnnotationType>, DatabaseError>;

    async fn list_all(&self) -> Result<Vec<AnnotationType>, DatabaseError>;

    /// Fails with `Conflict` while annotations still reference the type.
    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait AnnotationRepository: Send + Sync {
    async fn insert(&self, annotation: &Annotation) -> Result<(), DatabaseError>;

    async fn get(&self, id: Uuid) -> Result<Annotation, DatabaseError>;

    async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<Annotation>, DatabaseError>;

    async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<Annotation>, DatabaseError>;

    async fn list_all(&self) -> Result<Vec<Annotation>, DatabaseError>;

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(&self, document: &Document) -> Result<(), DatabaseError>;

    async fn get(&self, id: Uuid) -> Result<Document, DatabaseError>;

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>, DatabaseError>;

    async fn rename(&self, id: Uuid, name: &str) -> Result<Document, DatabaseError>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Records the report together with the annotations it references, all or nothing.
    async fn insert(&self, report: &Report, annotations: &[Annotation]) -> Result<(), DatabaseError>;

    async fn get(&self, id: Uuid) -> Result<Report, DatabaseError>;

    async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<Report>, DatabaseError>;
}
