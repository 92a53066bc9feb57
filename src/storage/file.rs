use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{ContentHandle, ContentStorage, StorageError};

const TEMP_PREFIX: &str = ".tmp-";

/// Path-addressed store: `{root}/{handle}{ext}`.
///
/// Writes land in a hidden temp file that is renamed into place once flushed,
/// so a write that is dropped halfway (request cancelled) never shows up
/// under a handle.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    ext: String,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        let ext = if ext.is_empty() || ext.starts_with('.') {
            ext
        } else {
            format!(".{}", ext)
        };
        Self { root: root.into(), ext }
    }

    /// Creates the root directory if missing.
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, handle: &ContentHandle) -> PathBuf {
        self.root.join(format!("{}{}", handle.as_str(), self.ext))
    }
}

#[async_trait]
impl ContentStorage for FileStorage {
    async fn put(&self, bytes: &[u8]) -> Result<ContentHandle, StorageError> {
        let handle = ContentHandle::generate();
        let target = self.path_for(&handle);

        // The `TempPath` unlinks the file when dropped, including when this
        // future is dropped mid-write. A detached create still cleans up once
        // its blocking task finishes.
        let root = self.root.clone();
        let (file, tmp) = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(root)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("temp file task failed: {}", e)))??
        .into_parts();

        let mut file = tokio::fs::File::from_std(file);
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::task::spawn_blocking(move || tmp.persist(&target).map(|()| target))
            .await
            .map_err(|e| StorageError::Unavailable(format!("persist task failed: {}", e)))?
            .map(|target| debug!("Stored {} bytes at {}", bytes.len(), target.display()))
            .map_err(|e| {
                warn!("Failed to move temp file into place: {}", e.error);
                StorageError::Io(e.error)
            })?;

        Ok(handle)
    }

    async fn get(&self, handle: &ContentHandle) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(self.path_for(handle)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(handle.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, handle: &ContentHandle) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(handle)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn put_then_get_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "pdf");
        storage.init().await.unwrap();

        let handle = storage.put(b"%PDF-1.4 body").await.unwrap();
        assert_eq!(storage.get(&handle).await.unwrap(), b"%PDF-1.4 body");
        assert!(dir.path().join(format!("{}.pdf", handle)).exists());
    }

    #[tokio::test]
    async fn leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), ".json");
        storage.init().await.unwrap();
        storage.put(b"{}").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with(".tmp-"));
    }

    #[tokio::test]
    async fn missing_handle_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "pdf");
        let handle = ContentHandle::generate();
        assert!(matches!(storage.get(&handle).await, Err(StorageError::NotFound(_))));
        storage.delete(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn put_fails_when_root_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("missing"), "pdf");
        assert!(matches!(storage.put(b"x").await, Err(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn cancelled_puts_leave_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "pdf");
        storage.init().await.unwrap();
        let big = vec![7u8; 32 * 1024 * 1024];

        for _ in 0..10 {
            let _ = tokio::time::timeout(Duration::from_millis(2), storage.put(&big)).await;
        }

        // detached blocking work may still be unwinding
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let leaked = temp_files(dir.path());
            if leaked.is_empty() {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "leaked temp files: {:?}", leaked);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // anything that did land is complete
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            assert_eq!(entry.unwrap().metadata().unwrap().len(), big.len() as u64);
        }
    }

    fn temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TEMP_PREFIX))
            .collect()
    }
}
