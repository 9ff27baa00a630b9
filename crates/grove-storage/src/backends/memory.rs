//! In-memory blob backend
//!
//! Ordered map of keys to bytes. Counts listing and delete calls so callers
//! can verify how a cleanup was batched.

use crate::{BlobBackend, ObjectPage, StorageError, StorageResult, DEFAULT_MAX_DELETE_BATCH};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory blob store
#[derive(Debug)]
pub struct MemoryBackend {
    bucket: String,
    objects: RwLock<BTreeMap<String, Bytes>>,
    max_delete_batch: usize,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            max_delete_batch: DEFAULT_MAX_DELETE_BATCH,
            list_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Emulate a store with a smaller bulk-delete limit
    pub fn with_max_delete_batch(mut self, limit: usize) -> Self {
        self.max_delete_batch = limit.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Number of `list_page` calls served
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete_batch` calls served
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        crate::validate_key(key)?;
        self.objects.write().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        Ok(self.objects.read().get(key).cloned())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ObjectPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let objects = self.objects.read();
        let lower = match continuation {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };
        let prefix = prefix.unwrap_or("");

        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(prefix));

        let keys: Vec<String> = matching.by_ref().take(max_keys.max(1)).cloned().collect();
        let continuation = match (matching.next(), keys.last()) {
            (Some(_), Some(last)) => Some(last.clone()),
            _ => None,
        };

        Ok(ObjectPage { keys, continuation })
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<usize> {
        if keys.len() > self.max_delete_batch {
            return Err(StorageError::Backend(format!(
                "batch of {} keys exceeds the delete limit of {}",
                keys.len(),
                self.max_delete_batch
            )));
        }
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let mut objects = self.objects.write();
        Ok(keys.iter().filter(|key| objects.remove(*key).is_some()).count())
    }

    fn max_delete_batch(&self) -> usize {
        self.max_delete_batch
    }
}
