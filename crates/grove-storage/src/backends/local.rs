//! Local filesystem storage backend
//!
//! Keys are `/`-separated paths relative to the configured root. Listings are
//! produced in key order and resume after the key given as continuation.

use crate::config::LocalStorageConfig;
use crate::{validate_key, BlobBackend, ObjectPage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Local filesystem storage backend
#[derive(Debug, Clone)]
pub struct LocalBackend {
    config: LocalStorageConfig,
}

impl LocalBackend {
    /// Create a new local storage backend
    pub fn new(config: LocalStorageConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root_path
    }

    /// Get the full filesystem path for a key
    fn full_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(key
            .split('/')
            .fold(self.config.root_path.clone(), |path, part| path.join(part)))
    }

    /// Every key under the root, sorted
    async fn all_keys(&self) -> StorageResult<Vec<String>> {
        let root = &self.config.root_path;
        let mut keys = Vec::new();
        if !fs::try_exists(root).await? {
            return Ok(keys);
        }

        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    let relative = path
                        .strip_prefix(root)
                        .map_err(|e| StorageError::Backend(format!("Path error: {}", e)))?;
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Remove now-empty directories between a deleted file and the root
    async fn prune_empty_parents(&self, file: &Path) {
        let mut current = file.parent();
        while let Some(dir) = current {
            if dir == self.config.root_path || !dir.starts_with(&self.config.root_path) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl BlobBackend for LocalBackend {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.full_path(key)?;
        if let Some(parent) = path.parent() {
            if self.config.create_directories {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&path, &data).await?;
        debug!(key, bytes = data.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        match fs::read(self.full_path(key)?).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.full_path(key)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ObjectPage> {
        let prefix = prefix.unwrap_or("");
        let mut matching = self
            .all_keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.map_or(true, |token| key.as_str() > token));

        let keys: Vec<String> = matching.by_ref().take(max_keys.max(1)).collect();
        let continuation = match (matching.next(), keys.last()) {
            (Some(_), Some(last)) => Some(last.clone()),
            _ => None,
        };

        Ok(ObjectPage { keys, continuation })
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<usize> {
        let mut removed = 0;
        for key in keys {
            let path = self.full_path(key)?;
            match fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    self.prune_empty_parents(&path).await;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}
