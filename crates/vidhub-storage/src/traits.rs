//! Storage abstraction trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked byte stream returned by reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Blob storage abstraction implemented by the local filesystem and S3
/// backends. Keys are opaque slash-separated paths under the store's
/// root (`videos/...`, `thumbnails/...`).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a blob at the given key, replacing any existing content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Stream the whole blob.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Stream `length` bytes starting at `offset`. The offset must be
    /// within the blob; short blobs end the stream early rather than
    /// erroring so callers validate bounds beforehand.
    async fn get_range_stream(&self, key: &str, offset: u64, length: u64)
        -> StorageResult<ByteStream>;

    /// Delete a blob. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Size in bytes of the stored blob.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;
}
