//! Local filesystem blob store.

use crate::traits::{BlobStore, ByteStream, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

const STREAM_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
    /// Cached canonical base path so key resolution does not
    /// canonicalize the root on every call.
    base_path_canonical: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let base_path_canonical = tokio::task::spawn_blocking({
            let p = base_path.clone();
            move || p.canonicalize()
        })
        .await
        .map_err(|e| StorageError::ConfigError(format!("spawn_blocking failed: {}", e)))?
        .map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        Ok(LocalBlobStore {
            base_path,
            base_path_canonical,
        })
    }

    /// Resolve a storage key to a filesystem path, rejecting traversal.
    async fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(key);

        if fs::try_exists(&path).await.unwrap_or(false) {
            let path_clone = path.clone();
            let canonical = tokio::task::spawn_blocking(move || path_clone.canonicalize())
                .await
                .map_err(|e| StorageError::ConfigError(format!("spawn_blocking failed: {}", e)))?
                .map_err(|e| {
                    StorageError::ConfigError(format!("Failed to canonicalize path: {}", e))
                })?;
            if canonical.strip_prefix(&self.base_path_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside the storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_to_path(key).await?;
        let size = data.len();
        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            tracing::error!(path = %path.display(), key = %key, error = %e, "Blob create failed");
            StorageError::UploadFailed(format!("Failed to create {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            tracing::error!(path = %path.display(), key = %key, error = %e, "Blob write failed");
            StorageError::UploadFailed(format!("Failed to write {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync {}: {}", path.display(), e))
        })?;

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob stored"
        );
        Ok(())
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let path = self.key_to_path(key).await?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let stream = ReaderStream::with_capacity(file, STREAM_CHUNK_BYTES).map(|result| {
            result.map_err(|e| StorageError::DownloadFailed(format!("Read failed: {}", e)))
        });
        Ok(Box::pin(stream))
    }

    async fn get_range_stream(
        &self,
        key: &str,
        offset: u64,
        length: u64,
    ) -> StorageResult<ByteStream> {
        let path = self.key_to_path(key).await?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let mut file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;

        file.seek(SeekFrom::Start(offset)).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Seek to {} failed: {}", offset, e))
        })?;

        let limited = file.take(length);
        let stream = ReaderStream::with_capacity(limited, STREAM_CHUNK_BYTES).map(|result| {
            result.map_err(|e| StorageError::DownloadFailed(format!("Read failed: {}", e)))
        });
        Ok(Box::pin(stream))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key).await?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            tracing::error!(path = %path.display(), key = %key, error = %e, "Blob delete failed");
            StorageError::DeleteFailed(format!("Failed to delete {}: {}", path.display(), e))
        })?;

        tracing::info!(key = %key, "Blob deleted");
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key).await?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let path = self.key_to_path(key).await?;
        let meta = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::BackendError(e.to_string())
            }
        })?;
        if !meta.is_file() {
            return Err(StorageError::BackendError(format!(
                "Storage key is not a file: {}",
                key
            )));
        }
        Ok(meta.len())
    }
}
