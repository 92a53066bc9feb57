use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, types::Json, PgPool, Row};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{
    Annotation, AnnotationType, Creator, Document, Payload, Region, Report, Role, TypeAccess,
    User,
};
use crate::database::repository::{
    AnnotationRepository, AnnotationTypeRepository, DocumentRepository, ReportRepository,
    UserRepository,
};
use crate::storage::ContentHandle;

/// All repositories backed by one PostgreSQL pool
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const USER_COLUMNS: &str =
    "id, handle, password_hash, role, name, surname, user_group, created_at, updated_at";
const TYPE_COLUMNS: &str = "id, creator_id, label, description, access, created_at";
const ANNOTATION_COLUMNS: &str = "id, document_id, type_id, creator_id, region, payload, created_at";
const DOCUMENT_COLUMNS: &str =
    "id, owner_id, name, content_type, size, page_count, content_handle, created_at, updated_at";
const REPORT_COLUMNS: &str =
    "id, document_id, requested_by, content_handle, content_type, size, annotation_ids, created_at";

fn corrupt(field: &str, detail: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::QueryError(format!("invalid {} in row: {}", field, detail))
}

fn user_from_row(row: &PgRow) -> Result<User, DatabaseError> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        handle: row.try_get("handle")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse::<Role>().map_err(|e| corrupt("role", e))?,
        name: row.try_get("name")?,
        surname: row.try_get("surname")?,
        group: row.try_get("user_group")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn type_from_row(row: &PgRow) -> Result<AnnotationType, DatabaseError> {
    let access: String = row.try_get("access")?;
    Ok(AnnotationType {
        id: row.try_get("id")?,
        creator_id: row.try_get("creator_id")?,
        label: row.try_get("label")?,
        description: row.try_get("description")?,
        access: access.parse::<TypeAccess>().map_err(|e| corrupt("access", e))?,
        created_at: row.try_get("created_at")?,
    })
}

fn annotation_from_row(row: &PgRow) -> Result<Annotation, DatabaseError> {
    let creator_id: Option<Uuid> = row.try_get("creator_id")?;
    let Json(region): Json<Region> = row.try_get("region")?;
    let Json(payload): Json<Payload> = row.try_get("payload")?;
    Ok(Annotation {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        type_id: row.try_get("type_id")?,
        creator: creator_id.map(Creator::User).unwrap_or(Creator::Detector),
        region,
        payload,
        created_at: row.try_get("created_at")?,
    })
}

fn handle_from_row(row: &PgRow) -> Result<ContentHandle, DatabaseError> {
    let raw: String = row.try_get("content_handle")?;
    ContentHandle::parse(raw).map_err(|e| corrupt("content_handle", e))
}

fn document_from_row(row: &PgRow) -> Result<Document, DatabaseError> {
    let page_count: i32 = row.try_get("page_count")?;
    Ok(Document {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        content_type: row.try_get("content_type")?,
        size: row.try_get("size")?,
        page_count: u32::try_from(page_count).map_err(|e| corrupt("page_count", e))?,
        content_handle: handle_from_row(row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn report_from_row(row: &PgRow) -> Result<Report, DatabaseError> {
    Ok(Report {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        requested_by: row.try_get("requested_by")?,
        content_handle: handle_from_row(row)?,
        content_type: row.try_get("content_type")?,
        size: row.try_get("size")?,
        annotation_ids: row.try_get("annotation_ids")?,
        created_at: row.try_get("created_at")?,
    })
}

fn collect<T>(rows: Vec<PgRow>, map: fn(&PgRow) -> Result<T, DatabaseError>) -> Result<Vec<T>, DatabaseError> {
    rows.iter().map(map).collect()
}

fn require_one(rows_affected: u64, what: impl FnOnce() -> String) -> Result<(), DatabaseError> {
    if rows_affected == 0 {
        Err(DatabaseError::NotFound(what()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgDatabase {
    async fn find_by_handle(&self, handle: &str) -> Result<User, DatabaseError> {
        let query = format!("SELECT {} FROM users WHERE handle = $1", USER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("user '{}'", handle)))?;
        user_from_row(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, DatabaseError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", id)))?;
        user_from_row(&row)
    }

    async fn insert(&self, user: &User) -> Result<(), DatabaseError> {
        let query = format!(
            "INSERT INTO users ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            USER_COLUMNS
        );
        sqlx::query(&query)
            .bind(user.id)
            .bind(&user.handle)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(&user.name)
            .bind(&user.surname)
            .bind(&user.group)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE users SET role = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(role.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        require_one(result.rows_affected(), || format!("user {}", id))
    }

    async fn list_all(&self) -> Result<Vec<User>, DatabaseError> {
        let query = format!("SELECT {} FROM users ORDER BY handle", USER_COLUMNS);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        collect(rows, user_from_row)
    }
}

#[async_trait]
impl AnnotationTypeRepository for PgDatabase {
    async fn insert(&self, annotation_type: &AnnotationType) -> Result<(), DatabaseError> {
        let query = format!(
            "INSERT INTO annotation_types ({}) VALUES ($1, $2, $3, $4, $5, $6)",
            TYPE_COLUMNS
        );
        sqlx::query(&query)
            .bind(annotation_type.id)
            .bind(annotation_type.creator_id)
            .bind(&annotation_type.label)
            .bind(&annotation_type.description)
            .bind(annotation_type.access.as_str())
            .bind(annotation_type.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<AnnotationType, DatabaseError> {
        let query = format!("SELECT {} FROM annotation_types WHERE id = $1", TYPE_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("annotation type {}", id)))?;
        type_from_row(&row)
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<AnnotationType>, DatabaseError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let query = format!(
            "SELECT {} FROM annotation_types WHERE id = ANY($1) ORDER BY label",
            TYPE_COLUMNS
        );
        let rows = sqlx::query(&query).bind(ids).fetch_all(&self.pool).await?;
        collect(rows, type_from_row)
    }

    async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<AnnotationType>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM annotation_types WHERE creator_id = $1 ORDER BY label",
            TYPE_COLUMNS
        );
        let rows = sqlx::query(&query).bind(creator_id).fetch_all(&self.pool).await?;
        collect(rows, type_from_row)
    }

    async fn list_all(&self) -> Result<Vec<AnnotationType>, DatabaseError> {
        let query = format!("SELECT {} FROM annotation_types ORDER BY label", TYPE_COLUMNS);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        collect(rows, type_from_row)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        // FK is ON DELETE RESTRICT, referenced types surface as Conflict
        let result = sqlx::query("DELETE FROM annotation_types WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_one(result.rows_affected(), || format!("annotation type {}", id))
    }
}

async fn insert_annotation<'e, E>(executor: E, annotation: &Annotation) -> Result<(), DatabaseError>
where
    E: sqlx::PgExecutor<'e>,
{
    let query = format!(
        "INSERT INTO annotations ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        ANNOTATION_COLUMNS
    );
    sqlx::query(&query)
        .bind(annotation.id)
        .bind(annotation.document_id)
        .bind(annotation.type_id)
        .bind(annotation.creator.user_id())
        .bind(Json(annotation.region))
        .bind(Json(annotation.payload))
        .bind(annotation.created_at)
        .execute(executor)
        .await?;
    Ok(())
}

#[async_trait]
impl AnnotationRepository for PgDatabase {
    async fn insert(&self, annotation: &Annotation) -> Result<(), DatabaseError> {
        insert_annotation(&self.pool, annotation).await
    }

    async fn get(&self, id: Uuid) -> Result<Annotation, DatabaseError> {
        let query = format!("SELECT {} FROM annotations WHERE id = $1", ANNOTATION_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("annotation {}", id)))?;
        annotation_from_row(&row)
    }

    async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<Annotation>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM annotations WHERE creator_id = $1 ORDER BY created_at, id",
            ANNOTATION_COLUMNS
        );
        let rows = sqlx::query(&query).bind(creator_id).fetch_all(&self.pool).await?;
        collect(rows, annotation_from_row)
    }

    async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<Annotation>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM annotations WHERE document_id = $1 ORDER BY created_at, id",
            ANNOTATION_COLUMNS
        );
        let rows = sqlx::query(&query).bind(document_id).fetch_all(&self.pool).await?;
        collect(rows, annotation_from_row)
    }

    async fn list_all(&self) -> Result<Vec<Annotation>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM annotations ORDER BY created_at, id",
            ANNOTATION_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        collect(rows, annotation_from_row)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM annotations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_one(result.rows_affected(), || format!("annotation {}", id))
    }
}

#[async_trait]
impl DocumentRepository for PgDatabase {
    async fn insert(&self, document: &Document) -> Result<(), DatabaseError> {
        let query = format!(
            "INSERT INTO documents ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            DOCUMENT_COLUMNS
        );
        let page_count =
            i32::try_from(document.page_count).map_err(|e| corrupt("page_count", e))?;
        sqlx::query(&query)
            .bind(document.id)
            .bind(document.owner_id)
            .bind(&document.name)
            .bind(&document.content_type)
            .bind(document.size)
            .bind(page_count)
            .bind(document.content_handle.as_str())
            .bind(document.created_at)
            .bind(document.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Document, DatabaseError> {
        let query = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("document {}", id)))?;
        document_from_row(&row)
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM documents WHERE owner_id = $1 ORDER BY created_at, id",
            DOCUMENT_COLUMNS
        );
        let rows = sqlx::query(&query).bind(owner_id).fetch_all(&self.pool).await?;
        collect(rows, document_from_row)
    }

    async fn rename(&self, id: Uuid, name: &str) -> Result<Document, DatabaseError> {
        let query = format!(
            "UPDATE documents SET name = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(name)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("document {}", id)))?;
        document_from_row(&row)
    }
}

#[async_trait]
impl ReportRepository for PgDatabase {
    async fn insert(&self, report: &Report, annotations: &[Annotation]) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        for annotation in annotations {
            insert_annotation(&mut *tx, annotation).await?;
        }

        let query = format!(
            "INSERT INTO reports ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            REPORT_COLUMNS
        );
        sqlx::query(&query)
            .bind(report.id)
            .bind(report.document_id)
            .bind(report.requested_by)
            .bind(report.content_handle.as_str())
            .bind(&report.content_type)
            .bind(report.size)
            .bind(&report.annotation_ids)
            .bind(report.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Report, DatabaseError> {
        let query = format!("SELECT {} FROM reports WHERE id = $1", REPORT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("report {}", id)))?;
        report_from_row(&row)
    }

    async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<Report>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM reports WHERE document_id = $1 ORDER BY created_at, id",
            REPORT_COLUMNS
        );
        let rows = sqlx::query(&query).bind(document_id).fetch_all(&self.pool).await?;
        collect(rows, report_from_row)
    }
}
