//! # grove-storage
//!
//! Blob store abstraction used by seed procedures and the reset workflow.
//!
//! ## Features
//!
//! - **Multi-backend support**: in-memory, local filesystem and AWS S3
//! - **Paginated listing** with opaque continuation tokens
//! - **Batched deletes** bounded by each store's bulk-delete limit
//! - **Prefix clearing**: see [`cleanup::clear_prefix`]
//!
//! ## Quick Start
//!
//! ```rust
//! use grove_storage::{BlobBackend, MemoryBackend, ClearOptions, clear_prefix};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = MemoryBackend::new("assets");
//! store.put("users/1/avatar.png", b"png".to_vec().into()).await.unwrap();
//!
//! let stats = clear_prefix(&store, Some("users/1/"), &ClearOptions::default()).await.unwrap();
//! assert_eq!(stats.deleted, 1);
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod backends;
pub mod cleanup;
pub mod config;

pub use backends::*;
pub use cleanup::*;
pub use config::*;

/// Bulk-delete limit of S3-compatible stores
pub const DEFAULT_MAX_DELETE_BATCH: usize = 1000;

/// Storage operation errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Token for the next page; `None` once the listing is exhausted
    pub continuation: Option<String>,
}

/// Blob store backend scoped to a single bucket
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Bucket (or root) this backend operates on
    fn bucket(&self) -> &str;

    /// Store an object, replacing any existing one
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Fetch an object's contents
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// List up to `max_keys` keys, in key order, after `continuation`
    async fn list_page(
        &self,
        prefix: Option<&str>,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ObjectPage>;

    /// Delete a batch of keys and return how many objects were removed.
    /// Keys that do not exist are skipped, not reported as errors.
    async fn delete_batch(&self, keys: &[String]) -> StorageResult<usize>;

    /// Largest batch [`delete_batch`](Self::delete_batch) accepts
    fn max_delete_batch(&self) -> usize {
        DEFAULT_MAX_DELETE_BATCH
    }
}

/// Reject keys that could escape a bucket root or address nothing
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("users/1/avatar.png").is_ok());
        assert!(validate_key("readme").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("dir/").is_err());
    }
}
