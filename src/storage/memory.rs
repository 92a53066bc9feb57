use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ContentHandle, ContentStorage, StorageError};

/// In-process store used by tests and by the server when no content directory is wanted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<RwLock<HashMap<ContentHandle, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStorage for MemoryStorage {
    async fn put(&self, bytes: &[u8]) -> Result<ContentHandle, StorageError> {
        let handle = ContentHandle::generate();
        self.blobs.write().await.insert(handle.clone(), bytes.to_vec());
        Ok(handle)
    }

    async fn get(&self, handle: &ContentHandle) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(handle.clone()))
    }

    async fn delete(&self, handle: &ContentHandle) -> Result<(), StorageError> {
        self.blobs.write().await.remove(handle);
        Ok(())
    }
}
