use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::database::models::{count_pages, Document, Report, Role};
use crate::database::{DatabaseError, DocumentRepository, ReportRepository};
use crate::pipeline::{PipelineFailure, ReportCreator};
use crate::storage::{ContentStorage, StorageError};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Report generation or upload failed; nothing was recorded.
    #[error("pipeline failed for document {document_id} (user {user_id}): {source}")]
    Pipeline {
        document_id: Uuid,
        user_id: Uuid,
        #[source]
        source: PipelineFailure,
    },

    #[error("content read failed: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] DatabaseError),
}

/// Keyed async mutex serializing report generation per document.
#[derive(Default)]
pub struct DocumentLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    pub async fn acquire(&self, document_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(document_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Outer pipeline: document and report persistence around a [`ReportCreator`].
pub struct DocumentService {
    documents: Arc<dyn DocumentRepository>,
    reports: Arc<dyn ReportRepository>,
    document_store: Arc<dyn ContentStorage>,
    report_store: Arc<dyn ContentStorage>,
    creator: ReportCreator,
    max_document_bytes: usize,
    locks: Option<DocumentLocks>,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        reports: Arc<dyn ReportRepository>,
        document_store: Arc<dyn ContentStorage>,
        report_store: Arc<dyn ContentStorage>,
        creator: ReportCreator,
    ) -> Self {
        Self {
            documents,
            reports,
            document_store,
            report_store,
            creator,
            max_document_bytes: usize::MAX,
            locks: None,
        }
    }

    pub fn with_max_document_bytes(mut self, max: usize) -> Self {
        self.max_document_bytes = max;
        self
    }

    /// Concurrent `create_report` calls for one document run one at a time.
    pub fn serialize_per_document(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(DocumentLocks::default);
        self
    }

    /// Content is stored first; metadata is only written once the bytes are durable.
    pub async fn upload_document(
        &self,
        owner: &AuthUser,
        name: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<Document, DocumentError> {
        let name = validate_name(name)?;
        if content.is_empty() {
            return Err(DocumentError::InvalidInput("document content is empty".to_string()));
        }
        if content.len() > self.max_document_bytes {
            return Err(DocumentError::InvalidInput(format!(
                "document exceeds {} bytes",
                self.max_document_bytes
            )));
        }
        let content_type = match content_type.trim() {
            "" => DEFAULT_CONTENT_TYPE,
            other => other,
        };

        let document_id = Uuid::new_v4();
        let pipeline = |source: PipelineFailure| DocumentError::Pipeline {
            document_id,
            user_id: owner.user_id,
            source,
        };

        let handle = self
            .document_store
            .put(content)
            .await
            .map_err(|e| pipeline(e.into()))?;

        let now = Utc::now();
        let document = Document {
            id: document_id,
            owner_id: owner.user_id,
            name,
            content_type: content_type.to_string(),
            size: content.len() as i64,
            page_count: count_pages(content_type, content),
            content_handle: handle,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.documents.insert(&document).await {
            self.discard(self.document_store.as_ref(), &document.content_handle).await;
            return Err(pipeline(e.into()));
        }

        info!(
            "User {} uploaded document {} '{}' ({} bytes, {} pages)",
            owner.handle, document.id, document.name, document.size, document.page_count
        );
        Ok(document)
    }

    /// Detect, resolve and render, then store the artifact and link its metadata.
    ///
    /// Any failure leaves no report record and no annotations behind.
    pub async fn create_report(&self, actor: &AuthUser, document_id: Uuid) -> Result<Report, DocumentError> {
        let document = self.authorized_document(actor, document_id).await?;
        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(document_id).await),
            None => None,
        };

        let pipeline = |source: PipelineFailure| {
            error!(
                "Report generation failed for document {} requested by {}: {}",
                document_id, actor.user_id, source
            );
            DocumentError::Pipeline {
                document_id,
                user_id: actor.user_id,
                source,
            }
        };

        let content = self
            .document_store
            .get(&document.content_handle)
            .await
            .map_err(|e| pipeline(e.into()))?;

        let report_id = Uuid::new_v4();
        let created = self
            .creator
            .create(report_id, &document, &content)
            .await
            .map_err(&pipeline)?;

        let handle = self
            .report_store
            .put(&created.artifact.bytes)
            .await
            .map_err(|e| pipeline(e.into()))?;

        let report = Report {
            id: report_id,
            document_id,
            requested_by: actor.user_id,
            content_handle: handle,
            content_type: created.artifact.content_type,
            size: created.artifact.bytes.len() as i64,
            annotation_ids: created.annotations.iter().map(|a| a.id).collect(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.reports.insert(&report, &created.annotations).await {
            self.discard(self.report_store.as_ref(), &report.content_handle).await;
            return Err(pipeline(e.into()));
        }

        info!(
            "Created report {} for document {} with {} annotations",
            report.id,
            document_id,
            report.annotation_ids.len()
        );
        Ok(report)
    }

    pub async fn get_document(&self, actor: &AuthUser, id: Uuid) -> Result<(Document, Vec<u8>), DocumentError> {
        let document = self.authorized_document(actor, id).await?;
        let content = self.document_store.get(&document.content_handle).await?;
        Ok((document, content))
    }

    pub async fn get_report(&self, actor: &AuthUser, id: Uuid) -> Result<(Report, Vec<u8>), DocumentError> {
        let report = match self.reports.get(id).await {
            Ok(report) => report,
            Err(DatabaseError::NotFound(_)) => return Err(missing(actor, "report", id)),
            Err(e) => return Err(e.into()),
        };
        // report access follows its source document
        self.authorized_document(actor, report.document_id).await?;

        let content = self.report_store.get(&report.content_handle).await?;
        Ok((report, content))
    }

    /// Metadata of the caller's own documents.
    pub async fn list_documents(&self, actor: &AuthUser) -> Result<Vec<Document>, DocumentError> {
        Ok(self.documents.list_by_owner(actor.user_id).await?)
    }

    pub async fn list_reports(&self, actor: &AuthUser, document_id: Uuid) -> Result<Vec<Report>, DocumentError> {
        self.authorized_document(actor, document_id).await?;
        Ok(self.reports.list_by_document(document_id).await?)
    }

    pub async fn rename_document(&self, actor: &AuthUser, id: Uuid, name: &str) -> Result<Document, DocumentError> {
        let name = validate_name(name)?;
        self.authorized_document(actor, id).await?;
        let document = self.documents.rename(id, &name).await?;
        info!("User {} renamed document {} to '{}'", actor.handle, id, document.name);
        Ok(document)
    }

    async fn authorized_document(&self, actor: &AuthUser, id: Uuid) -> Result<Document, DocumentError> {
        match self.documents.get(id).await {
            Ok(document) if document.owner_id == actor.user_id || is_elevated(actor) => Ok(document),
            Ok(_) => {
                warn!("User {} denied access to document {}", actor.user_id, id);
                Err(DocumentError::Forbidden(format!("no access to document {}", id)))
            }
            Err(DatabaseError::NotFound(_)) => Err(missing(actor, "document", id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn discard(&self, store: &dyn ContentStorage, handle: &crate::storage::ContentHandle) {
        if let Err(e) = store.delete(handle).await {
            warn!("Failed to discard unlinked content {}: {}", handle, e);
        }
    }
}

fn is_elevated(actor: &AuthUser) -> bool {
    actor.role.satisfies(Role::Controller)
}

/// Non-elevated callers cannot tell a missing id from a foreign one.
fn missing(actor: &AuthUser, what: &str, id: Uuid) -> DocumentError {
    if is_elevated(actor) {
        DocumentError::NotFound(format!("{} {}", what, id))
    } else {
        DocumentError::Forbidden(format!("no access to {} {}", what, id))
    }
}

fn validate_name(name: &str) -> Result<String, DocumentError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DocumentError::InvalidInput("document name is empty".to_string()));
    }
    if name.len() > 255 {
        return Err(DocumentError::InvalidInput("document name exceeds 255 characters".to_string()));
    }
    Ok(name.to_string())
}
