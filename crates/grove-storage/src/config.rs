//! Storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Local filesystem backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Directory acting as the bucket root
    pub root_path: PathBuf,

    /// Logical bucket name reported by the backend
    pub bucket: String,

    /// Create parent directories on put
    pub create_directories: bool,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("./storage"),
            bucket: "local".to_string(),
            create_directories: true,
        }
    }
}

impl LocalStorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.root_path = path.into();
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn no_create_directories(mut self) -> Self {
        self.create_directories = false;
        self
    }
}

/// S3 backend configuration, used when the backend loads its own client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,

    /// Region override; the default provider chain is used when unset
    pub region: Option<String>,

    /// Custom endpoint (MinIO, LocalStack, ...)
    pub endpoint: Option<String>,

    /// Path-style addressing, needed by most S3 emulators
    pub path_style: bool,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            path_style: false,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn path_style(mut self) -> Self {
        self.path_style = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config_builder() {
        let config = LocalStorageConfig::new()
            .with_root_path("/tmp/blobs")
            .with_bucket("assets")
            .no_create_directories();
        assert_eq!(config.root_path, PathBuf::from("/tmp/blobs"));
        assert_eq!(config.bucket, "assets");
        assert!(!config.create_directories);
    }

    #[test]
    fn test_s3_config_builder() {
        let config = S3Config::new("assets")
            .with_region("eu-west-1")
            .with_endpoint("http://localhost:4566")
            .path_style();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert!(config.path_style);
    }
}
