//! Construct the configured blob store backend.

use std::sync::Arc;

use vidhub_core::config::{StorageBackend, StorageConfig};

use crate::local::LocalBlobStore;
use crate::s3::S3BlobStore;
use crate::traits::{BlobStore, StorageError, StorageResult};

pub async fn create_blob_store(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    match config.backend {
        StorageBackend::Local => {
            let path = config.local_path.as_deref().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH is not set".to_string())
            })?;
            let store = LocalBlobStore::new(path).await?;
            tracing::info!(path = %path, "Using local blob store");
            Ok(Arc::new(store))
        }
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET is not set".to_string()))?;
            let region = config
                .s3_region
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_REGION is not set".to_string()))?;
            let store = S3BlobStore::new(bucket, region, config.s3_endpoint.clone())?;
            Ok(Arc::new(store))
        }
    }
}
