//! In-memory key-value backend
//!
//! Items live in an ordered map keyed by [`ItemKey`], so scans and queries
//! come back in key order and a cursor is simply the last key returned.

use crate::{Item, ItemKey, KeyPage, KeyValueBackend, KvError, KvResult, PartitionQuery, DEFAULT_MAX_BATCH_DELETE};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory key-value table
#[derive(Debug)]
pub struct MemoryBackend {
    table: String,
    items: RwLock<BTreeMap<ItemKey, Item>>,
    max_batch_delete: usize,
    batch_calls: AtomicUsize,
    scan_calls: AtomicUsize,
    /// Remaining batch calls that leave their last key unprocessed
    throttled_batches: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            items: RwLock::new(BTreeMap::new()),
            max_batch_delete: DEFAULT_MAX_BATCH_DELETE,
            batch_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
            throttled_batches: AtomicUsize::new(0),
        }
    }

    pub fn with_max_batch_delete(mut self, limit: usize) -> Self {
        self.max_batch_delete = limit.max(1);
        self
    }

    /// Make the next `batches` delete calls report their last key as
    /// unprocessed, the way a throttled store does
    pub fn with_throttled_batches(self, batches: usize) -> Self {
        self.throttled_batches.store(batches, Ordering::SeqCst);
        self
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn keys(&self) -> Vec<ItemKey> {
        self.items.read().keys().cloned().collect()
    }

    /// Number of `batch_delete` calls served
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of `scan_keys` and `query_keys` calls served
    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    fn page<F>(&self, cursor: Option<&ItemKey>, limit: usize, keep: F) -> KeyPage
    where
        F: Fn(&ItemKey) -> bool,
    {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);

        let items = self.items.read();
        let lower = match cursor {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };

        let mut matching = items
            .range((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .filter(|key| keep(key));

        let keys: Vec<ItemKey> = matching.by_ref().take(limit.max(1)).cloned().collect();
        let cursor = match (matching.next(), keys.last()) {
            (Some(_), Some(last)) => Some(last.clone()),
            _ => None,
        };

        KeyPage { keys, cursor }
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    fn table(&self) -> &str {
        &self.table
    }

    async fn put_item(&self, item: Item) -> KvResult<()> {
        if item.key.partition.is_empty() {
            return Err(KvError::InvalidKey("empty partition key".to_string()));
        }
        self.items.write().insert(item.key.clone(), item);
        Ok(())
    }

    async fn get_item(&self, key: &ItemKey) -> KvResult<Option<Item>> {
        Ok(self.items.read().get(key).cloned())
    }

    async fn scan_keys(&self, cursor: Option<&ItemKey>, limit: usize) -> KvResult<KeyPage> {
        Ok(self.page(cursor, limit, |_| true))
    }

    async fn query_keys(
        &self,
        query: &PartitionQuery,
        cursor: Option<&ItemKey>,
        limit: usize,
    ) -> KvResult<KeyPage> {
        Ok(self.page(cursor, limit, |key| query.matches(key)))
    }

    async fn batch_delete(&self, keys: &[ItemKey]) -> KvResult<Vec<ItemKey>> {
        if keys.len() > self.max_batch_delete {
            return Err(KvError::Backend(format!(
                "batch of {} keys exceeds the delete limit of {}",
                keys.len(),
                self.max_batch_delete
            )));
        }
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        let throttled = !keys.is_empty()
            && self
                .throttled_batches
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();

        let (processed, unprocessed) = if throttled {
            keys.split_at(keys.len() - 1)
        } else {
            (keys, &[][..])
        };

        let mut items = self.items.write();
        for key in processed {
            items.remove(key);
        }
        Ok(unprocessed.to_vec())
    }

    fn max_batch_delete(&self) -> usize {
        self.max_batch_delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_with(keys: &[(&str, &str)]) -> MemoryBackend {
        let table = MemoryBackend::new("test");
        for (partition, sort) in keys {
            table
                .put_item(Item::new(ItemKey::composite(*partition, *sort)))
                .await
                .unwrap();
        }
        table
    }

    #[tokio::test]
    async fn test_scan_pages_with_cursor() {
        let table = table_with(&[("a", "1"), ("a", "2"), ("b", "1")]).await;

        let first = table.scan_keys(None, 2).await.unwrap();
        assert_eq!(first.keys.len(), 2);
        assert_eq!(first.cursor, Some(ItemKey::composite("a", "2")));

        let second = table.scan_keys(first.cursor.as_ref(), 2).await.unwrap();
        assert_eq!(second.keys, vec![ItemKey::composite("b", "1")]);
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn test_query_keys_by_partition_and_prefix() {
        let table = table_with(&[("u1", "s#1"), ("u1", "s#2"), ("u1", "p"), ("u2", "s#1")]).await;

        let page = table
            .query_keys(&PartitionQuery::new("u1").with_sort_prefix("s#"), None, 10)
            .await
            .unwrap();
        assert_eq!(
            page.keys,
            vec![ItemKey::composite("u1", "s#1"), ItemKey::composite("u1", "s#2")]
        );
    }

    #[tokio::test]
    async fn test_batch_delete_ignores_missing_keys() {
        let table = table_with(&[("a", "1")]).await;
        let unprocessed = table
            .batch_delete(&[ItemKey::composite("a", "1"), ItemKey::composite("zz", "9")])
            .await
            .unwrap();
        assert!(unprocessed.is_empty());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_throttled_batch_reports_unprocessed() {
        let table = table_with(&[("a", "1"), ("a", "2")]).await.with_throttled_batches(1);
        let keys = table.keys();

        let unprocessed = table.batch_delete(&keys).await.unwrap();
        assert_eq!(unprocessed, vec![ItemKey::composite("a", "2")]);
        assert_eq!(table.len(), 1);

        let unprocessed = table.batch_delete(&unprocessed).await.unwrap();
        assert!(unprocessed.is_empty());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_batch_limit_enforced() {
        let table = MemoryBackend::new("test");
        let keys: Vec<ItemKey> = (0..26).map(|i| ItemKey::partition(i.to_string())).collect();
        assert!(table.batch_delete(&keys).await.is_err());
        assert_eq!(table.batch_calls(), 0);
    }
}
