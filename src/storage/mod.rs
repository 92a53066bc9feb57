//! Binary content storage for documents and reports.
//!
//! Payloads live outside the relational store and are addressed by an opaque
//! [`ContentHandle`]. Stores never update in place: `put` always mints a new
//! handle and a handle is only visible once its bytes are fully written.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHandle(String);

impl ContentHandle {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accepts only the handle alphabet so a handle can never escape its directory.
    pub fn parse(raw: impl Into<String>) -> Result<Self, StorageError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= 64
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw))
        } else {
            Err(StorageError::InvalidHandle(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("content not found: {0}")]
    NotFound(ContentHandle),

    #[error("invalid content handle '{0}'")]
    InvalidHandle(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ContentStorage: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> Result<ContentHandle, StorageError>;

    async fn get(&self, handle: &ContentHandle) -> Result<Vec<u8>, StorageError>;

    /// Best-effort removal, used to discard content whose metadata was never linked.
    async fn delete(&self, handle: &ContentHandle) -> Result<(), StorageError>;
}
