use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from the metadata store
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some("23505") => return DatabaseError::Duplicate(db.message().to_string()),
                Some("23503") => return DatabaseError::Conflict(db.message().to_string()),
                _ => {}
            }
        }
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            other => DatabaseError::Sqlx(other),
        }
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        handle TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        name TEXT,
        surname TEXT,
        user_group TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS annotation_types (
        id UUID PRIMARY KEY,
        creator_id UUID NOT NULL REFERENCES users(id),
        label TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL,
        access TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id UUID PRIMARY KEY,
        owner_id UUID NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        content_type TEXT NOT NULL,
        size BIGINT NOT NULL,
        page_count INTEGER NOT NULL,
        content_handle TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reports (
        id UUID PRIMARY KEY,
        document_id UUID NOT NULL REFERENCES documents(id),
        requested_by UUID NOT NULL REFERENCES users(id),
        content_handle TEXT NOT NULL,
        content_type TEXT NOT NULL,
        size BIGINT NOT NULL,
        annotation_ids UUID[] NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS annotations (
        id UUID PRIMARY KEY,
        document_id UUID NOT NULL REFERENCES documents(id),
        type_id UUID NOT NULL REFERENCES annotation_types(id) ON DELETE RESTRICT,
        creator_id UUID REFERENCES users(id),
        region JSONB NOT NULL,
        payload JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS annotations_creator_idx ON annotations (creator_id)",
    "CREATE INDEX IF NOT EXISTS documents_owner_idx ON documents (owner_id)",
];

/// Connection setup and schema bootstrap for the PostgreSQL metadata store
pub struct DatabaseManager;

impl DatabaseManager {
    /// Open a pool against `database.url`
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let raw = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let url = Self::validate_url(raw)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url.as_str())
            .await?;

        info!(
            "Connected to database {} on {}",
            url.path().trim_start_matches('/'),
            url.host_str().unwrap_or("localhost")
        );
        Ok(pool)
    }

    /// Create tables that do not exist yet. Safe to run on every start.
    pub async fn bootstrap_schema(pool: &PgPool) -> Result<(), DatabaseError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        info!("Database schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    fn validate_url(raw: &str) -> Result<url::Url, DatabaseError> {
        let url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        match url.scheme() {
            "postgres" | "postgresql" => {}
            _ => return Err(DatabaseError::InvalidDatabaseUrl),
        }
        if url.path().trim_start_matches('/').is_empty() {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }
        Ok(url)
    }
}
