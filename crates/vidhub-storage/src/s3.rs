//! S3 blob store over `object_store`, compatible with MinIO and other
//! S3-like providers via a custom endpoint.

use crate::traits::{BlobStore, ByteStream, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{Error as ObjectStoreError, GetOptions, GetRange, ObjectStore, PutPayload};

#[derive(Clone)]
pub struct S3BlobStore {
    store: AmazonS3,
}

fn map_error(key: &str, err: ObjectStoreError) -> StorageError {
    match err {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        other => StorageError::BackendError(other.to_string()),
    }
}

impl S3BlobStore {
    /// Credentials come from the environment (AWS_ACCESS_KEY_ID /
    /// AWS_SECRET_ACCESS_KEY or an instance profile).
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .with_region(&region);

        if let Some(endpoint) = &endpoint_url {
            builder = builder.with_endpoint(endpoint);
            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to build S3 store: {}", e)))?;

        tracing::info!(bucket = %bucket, region = %region, endpoint = ?endpoint_url, "S3 blob store ready");
        Ok(Self { store })
    }

    fn object_path(key: &str) -> StorageResult<Path> {
        if key.is_empty() || key.contains("..") {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        Path::parse(key)
            .map_err(|e| StorageError::InvalidKey(format!("Invalid storage key {}: {}", key, e)))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = Self::object_path(key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        self.store
            .put(&path, PutPayload::from(data))
            .await
            .map_err(|e| StorageError::UploadFailed(format!("S3 put failed for {}: {}", key, e)))?;

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob stored"
        );
        Ok(())
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let path = Self::object_path(key)?;
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| map_error(key, e))?;

        let key_owned = key.to_string();
        let stream = result.into_stream().map(move |chunk| {
            chunk.map_err(|e| {
                StorageError::DownloadFailed(format!("S3 read failed for {}: {}", key_owned, e))
            })
        });
        Ok(Box::pin(stream))
    }

    async fn get_range_stream(
        &self,
        key: &str,
        offset: u64,
        length: u64,
    ) -> StorageResult<ByteStream> {
        let path = Self::object_path(key)?;
        let options = GetOptions {
            range: Some(GetRange::Bounded(offset..offset + length)),
            ..Default::default()
        };

        let result = self
            .store
            .get_opts(&path, options)
            .await
            .map_err(|e| map_error(key, e))?;

        let key_owned = key.to_string();
        let stream = result.into_stream().map(move |chunk| {
            chunk.map_err(|e| {
                StorageError::DownloadFailed(format!("S3 read failed for {}: {}", key_owned, e))
            })
        });
        Ok(Box::pin(stream))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = Self::object_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "S3 delete failed for {}: {}",
                key, e
            ))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = Self::object_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let path = Self::object_path(key)?;
        let meta = self.store.head(&path).await.map_err(|e| map_error(key, e))?;
        Ok(meta.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_rejects_traversal() {
        assert!(S3BlobStore::object_path("videos/../secrets").is_err());
        assert!(S3BlobStore::object_path("").is_err());
        assert!(S3BlobStore::object_path("videos/abc123").is_ok());
    }
}
