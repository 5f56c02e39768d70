//! Blob storage abstraction with local filesystem and S3 backends.
//!
//! Originals live under `videos/<key>` and generated thumbnails under
//! `thumbnails/<video_id>.jpg`. Reads are streamed; the ranged read is
//! the primitive behind HTTP range responses and never buffers the
//! whole object.

mod factory;
pub mod keys;
mod local;
mod s3;
mod traits;

pub use factory::create_blob_store;
pub use local::LocalBlobStore;
pub use s3::S3BlobStore;
pub use traits::{BlobStore, ByteStream, StorageError, StorageResult};
