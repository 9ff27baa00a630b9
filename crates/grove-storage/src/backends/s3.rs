//! AWS S3 storage backend
//!
//! Wraps a caller-configured `aws_sdk_s3::Client`. Listing uses
//! ListObjectsV2 continuation tokens; deletes use DeleteObjects in quiet mode.

#[cfg(feature = "aws-s3")]
use crate::config::S3Config;
#[cfg(feature = "aws-s3")]
use crate::{BlobBackend, ObjectPage, StorageError, StorageResult};
#[cfg(feature = "aws-s3")]
use async_trait::async_trait;
#[cfg(feature = "aws-s3")]
use aws_sdk_s3::primitives::ByteStream;
#[cfg(feature = "aws-s3")]
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
#[cfg(feature = "aws-s3")]
use aws_sdk_s3::Client;
#[cfg(feature = "aws-s3")]
use bytes::Bytes;
#[cfg(feature = "aws-s3")]
use tracing::warn;

/// AWS S3 storage backend
#[cfg(feature = "aws-s3")]
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
}

#[cfg(feature = "aws-s3")]
impl S3Backend {
    /// Use an already-configured client
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the default provider chain plus `config` overrides
    pub async fn from_config(config: S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.path_style)
            .build();

        Self::new(Client::from_conf(s3_config), config.bucket)
    }

    fn backend_error(context: &str, error: impl std::fmt::Display) -> StorageError {
        StorageError::Network(format!("{}: {}", context, error))
    }
}

#[cfg(feature = "aws-s3")]
#[async_trait]
impl BlobBackend for S3Backend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Self::backend_error("PutObject failed", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| Self::backend_error("Failed to read S3 object body", e))?
                    .into_bytes();
                Ok(Some(bytes))
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(Self::backend_error("GetObject failed", service_error))
                }
            }
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(Self::backend_error("HeadObject failed", service_error))
                }
            }
        }
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(continuation.map(str::to_string))
            .max_keys(max_keys.clamp(1, 1000) as i32)
            .send()
            .await
            .map_err(|e| Self::backend_error("ListObjectsV2 failed", e))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();

        let continuation = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ObjectPage { keys, continuation })
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::InvalidKey(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| Self::backend_error("DeleteObjects failed", e))?;

        // Quiet mode only reports failures; absent keys count as deleted
        let failures = output.errors();
        if let Some(first) = failures.first() {
            warn!(
                bucket = %self.bucket,
                failed = failures.len(),
                "DeleteObjects reported failures"
            );
            return Err(StorageError::Backend(format!(
                "failed to delete {} of {} keys (first: {} {})",
                failures.len(),
                keys.len(),
                first.key().unwrap_or("?"),
                first.message().unwrap_or("unknown error"),
            )));
        }

        Ok(keys.len())
    }
}

// Stub implementation when aws-s3 feature is not enabled
#[cfg(not(feature = "aws-s3"))]
pub struct S3Backend;

#[cfg(not(feature = "aws-s3"))]
impl S3Backend {
    pub fn unavailable() -> crate::StorageError {
        crate::StorageError::Configuration(
            "S3 backend requires the 'aws-s3' feature to be enabled".to_string(),
        )
    }
}
