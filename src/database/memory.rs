use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{Annotation, AnnotationType, Document, Report, Role, User};
use crate::database::repository::{
    AnnotationRepository, AnnotationTypeRepository, DocumentRepository, ReportRepository,
    UserRepository,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    annotation_types: HashMap<Uuid, AnnotationType>,
    annotations: HashMap<Uuid, Annotation>,
    documents: HashMap<Uuid, Document>,
    reports: HashMap<Uuid, Report>,
}

/// All repositories over one in-process table set.
///
/// A single lock guards every table, so multi-record writes such as
/// [`ReportRepository::insert`] are atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl UserRepository for MemoryDatabase {
    async fn find_by_handle(&self, handle: &str) -> Result<User, DatabaseError> {
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.handle == handle)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("user '{}'", handle)))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, DatabaseError> {
        self.tables
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", id)))
    }

    async fn insert(&self, user: &User) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.handle == user.handle) {
            return Err(DatabaseError::Duplicate(format!("handle '{}'", user.handle)));
        }
        if tables.users.contains_key(&user.id) {
            return Err(DatabaseError::Duplicate(format!("user {}", user.id)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", id)))?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<User>, DatabaseError> {
        let users = self.tables.read().await.users.values().cloned().collect();
        Ok(sorted_by(users, |u: &User| u.handle.clone()))
    }
}

#[async_trait]
impl AnnotationTypeRepository for MemoryDatabase {
    async fn insert(&self, annotation_type: &AnnotationType) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables
            .annotation_types
            .values()
            .any(|t| t.label == annotation_type.label)
        {
            return Err(DatabaseError::Duplicate(format!(
                "annotation type '{}'",
                annotation_type.label
            )));
        }
        tables
            .annotation_types
            .insert(annotation_type.id, annotation_type.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<AnnotationType, DatabaseError> {
        self.tables
            .read()
            .await
            .annotation_types
            .get(&id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("annotation type {}", id)))
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<AnnotationType>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.annotation_types.get(id).cloned())
            .collect())
    }

    async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<AnnotationType>, DatabaseError> {
        let types = self
            .tables
            .read()
            .await
            .annotation_types
            .values()
            .filter(|t| t.creator_id == creator_id)
            .cloned()
            .collect();
        Ok(sorted_by(types, |t: &AnnotationType| t.label.clone()))
    }

    async fn list_all(&self) -> Result<Vec<AnnotationType>, DatabaseError> {
        let types = self
            .tables
            .read()
            .await
            .annotation_types
            .values()
            .cloned()
            .collect();
        Ok(sorted_by(types, |t: &AnnotationType| t.label.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if !tables.annotation_types.contains_key(&id) {
            return Err(DatabaseError::NotFound(format!("annotation type {}", id)));
        }
        if tables.annotations.values().any(|a| a.type_id == id) {
            return Err(DatabaseError::Conflict(format!(
                "annotation type {} is referenced by annotations",
                id
            )));
        }
        tables.annotation_types.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl AnnotationRepository for MemoryDatabase {
    async fn insert(&self, annotation: &Annotation) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if !tables.annotation_types.contains_key(&annotation.type_id) {
            return Err(DatabaseError::Conflict(format!(
                "annotation type {} does not exist",
                annotation.type_id
            )));
        }
        if tables.annotations.contains_key(&annotation.id) {
            return Err(DatabaseError::Duplicate(format!("annotation {}", annotation.id)));
        }
        tables.annotations.insert(annotation.id, annotation.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Annotation, DatabaseError> {
        self.tables
            .read()
            .await
            .annotations
            .get(&id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("annotation {}", id)))
    }

    async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<Annotation>, DatabaseError> {
        let annotations = self
            .tables
            .read()
            .await
            .annotations
            .values()
            .filter(|a| a.creator.user_id() == Some(creator_id))
            .cloned()
            .collect();
        Ok(sorted_by(annotations, |a: &Annotation| (a.created_at, a.id)))
    }

    async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<Annotation>, DatabaseError> {
        let annotations = self
            .tables
            .read()
            .await
            .annotations
            .values()
            .filter(|a| a.document_id == document_id)
            .cloned()
            .collect();
        Ok(sorted_by(annotations, |a: &Annotation| (a.created_at, a.id)))
    }

    async fn list_all(&self) -> Result<Vec<Annotation>, DatabaseError> {
        let annotations = self.tables.read().await.annotations.values().cloned().collect();
        Ok(sorted_by(annotations, |a: &Annotation| (a.created_at, a.id)))
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.tables
            .write()
            .await
            .annotations
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DatabaseError::NotFound(format!("annotation {}", id)))
    }
}

#[async_trait]
impl DocumentRepository for MemoryDatabase {
    async fn insert(&self, document: &Document) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.documents.contains_key(&document.id) {
            return Err(DatabaseError::Duplicate(format!("document {}", document.id)));
        }
        tables.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Document, DatabaseError> {
        self.tables
            .read()
            .await
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("document {}", id)))
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>, DatabaseError> {
        let documents = self
            .tables
            .read()
            .await
            .documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(sorted_by(documents, |d: &Document| (d.created_at, d.id)))
    }

    async fn rename(&self, id: Uuid, name: &str) -> Result<Document, DatabaseError> {
        let mut tables = self.tables.write().await;
        let document = tables
            .documents
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("document {}", id)))?;
        document.name = name.to_string();
        document.updated_at = Utc::now();
        Ok(document.clone())
    }
}

#[async_trait]
impl ReportRepository for MemoryDatabase {
    async fn insert(&self, report: &Report, annotations: &[Annotation]) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;

        // validate everything before touching any table
        if tables.reports.contains_key(&report.id) {
            return Err(DatabaseError::Duplicate(format!("report {}", report.id)));
        }
        if !tables.documents.contains_key(&report.document_id) {
            return Err(DatabaseError::Conflict(format!(
                "document {} does not exist",
                report.document_id
            )));
        }
        for annotation in annotations {
            if !tables.annotation_types.contains_key(&annotation.type_id) {
                return Err(DatabaseError::Conflict(format!(
                    "annotation type {} does not exist",
                    annotation.type_id
                )));
            }
            if tables.annotations.contains_key(&annotation.id) {
                return Err(DatabaseError::Duplicate(format!("annotation {}", annotation.id)));
            }
        }

        for annotation in annotations {
            tables.annotations.insert(annotation.id, annotation.clone());
        }
        tables.reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Report, DatabaseError> {
        self.tables
            .read()
            .await
            .reports
            .get(&id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("report {}", id)))
    }

    async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<Report>, DatabaseError> {
        let reports = self
            .tables
            .read()
            .await
            .reports
            .values()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect();
        Ok(sorted_by(reports, |r: &Report| (r.created_at, r.id)))
    }
}
