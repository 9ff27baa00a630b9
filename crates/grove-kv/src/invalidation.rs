//! Partition clearing
//!
//! Pages of keys are read with the store's own cursor and each page is
//! removed with a single bulk-delete call. Page size is capped by the
//! store's bulk-delete limit so that one call always suffices.

use crate::{ItemKey, KeyValueBackend, KvError, KvResult, PartitionQuery, DEFAULT_MAX_BATCH_DELETE};
use tracing::{debug, info, warn};

/// Tuning for [`clear_partition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOptions {
    /// Keys read per page; capped by the backend's bulk-delete limit
    pub page_size: usize,
    /// Extra delete calls allowed for keys the store left unprocessed
    pub max_unprocessed_retries: usize,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_MAX_BATCH_DELETE,
            max_unprocessed_retries: 3,
        }
    }
}

impl ClearOptions {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_unprocessed_retries(mut self, retries: usize) -> Self {
        self.max_unprocessed_retries = retries;
        self
    }
}

/// Outcome of a [`clear_partition`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearStats {
    pub deleted: usize,
    pub pages: usize,
    pub batches: usize,
    /// Delete calls spent on previously unprocessed keys
    pub retries: usize,
}

/// Delete every item matching `query`, or the whole table when `None`.
///
/// Clearing an empty table or partition succeeds with a count of zero.
/// Keys that are already gone do not fail the call.
#[tracing::instrument(skip(backend, options), fields(table = %backend.table()))]
pub async fn clear_partition(
    backend: &dyn KeyValueBackend,
    query: Option<&PartitionQuery>,
    options: &ClearOptions,
) -> KvResult<ClearStats> {
    let limit = options.page_size.min(backend.max_batch_delete()).max(1);
    let mut stats = ClearStats::default();
    let mut cursor: Option<ItemKey> = None;

    loop {
        let page = match query {
            Some(query) => backend.query_keys(query, cursor.as_ref(), limit).await?,
            None => backend.scan_keys(cursor.as_ref(), limit).await?,
        };
        stats.pages += 1;

        if !page.keys.is_empty() {
            delete_page(backend, page.keys, options, &mut stats).await?;
        }

        cursor = page.cursor;
        if cursor.is_none() {
            break;
        }
    }

    info!(
        deleted = stats.deleted,
        pages = stats.pages,
        retries = stats.retries,
        "Cleared key-value items"
    );
    Ok(stats)
}

async fn delete_page(
    backend: &dyn KeyValueBackend,
    keys: Vec<ItemKey>,
    options: &ClearOptions,
    stats: &mut ClearStats,
) -> KvResult<()> {
    let requested = keys.len();
    let mut pending = backend.batch_delete(&keys).await?;
    stats.batches += 1;

    let mut attempts = 1;
    while !pending.is_empty() {
        if attempts > options.max_unprocessed_retries {
            warn!(unprocessed = pending.len(), attempts, "Giving up on unprocessed keys");
            return Err(KvError::Unprocessed {
                count: pending.len(),
                attempts,
            });
        }
        debug!(unprocessed = pending.len(), attempt = attempts, "Retrying unprocessed keys");
        pending = backend.batch_delete(&pending).await?;
        stats.batches += 1;
        stats.retries += 1;
        attempts += 1;
    }

    stats.deleted += requested;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::Item;

    async fn fill(table: &MemoryBackend, partition: &str, count: usize) {
        for i in 0..count {
            table
                .put_item(Item::new(ItemKey::composite(partition, format!("{:04}", i))))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_full_table_clear_one_batch_per_page() {
        let table = MemoryBackend::new("sessions");
        fill(&table, "a", 30).await;
        fill(&table, "b", 30).await;

        let stats = clear_partition(&table, None, &ClearOptions::default()).await.unwrap();

        assert_eq!(stats.deleted, 60);
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.batches, 3);
        assert_eq!(table.batch_calls(), 3);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_partition_query_leaves_other_partitions() {
        let table = MemoryBackend::new("sessions");
        fill(&table, "user#1", 40).await;
        fill(&table, "user#2", 5).await;

        let query = PartitionQuery::new("user#1");
        let stats = clear_partition(&table, Some(&query), &ClearOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.deleted, 40);
        assert_eq!(table.len(), 5);
        assert!(table.keys().iter().all(|k| k.partition == "user#2"));
    }

    #[tokio::test]
    async fn test_empty_table_is_noop() {
        let table = MemoryBackend::new("sessions");
        let stats = clear_partition(&table, None, &ClearOptions::default()).await.unwrap();
        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.pages, 1);
        assert_eq!(table.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_page_size_capped_by_store_limit() {
        let table = MemoryBackend::new("sessions").with_max_batch_delete(10);
        fill(&table, "a", 25).await;

        let options = ClearOptions::default().with_page_size(100);
        let stats = clear_partition(&table, None, &options).await.unwrap();
        assert_eq!(stats.deleted, 25);
        assert_eq!(stats.batches, 3);
    }

    #[tokio::test]
    async fn test_unprocessed_keys_are_retried() {
        let table = MemoryBackend::new("sessions").with_throttled_batches(2);
        fill(&table, "a", 10).await;

        let stats = clear_partition(&table, None, &ClearOptions::default()).await.unwrap();
        assert_eq!(stats.deleted, 10);
        assert_eq!(stats.retries, 2);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_unprocessed_keys_exhaust_retries() {
        let table = MemoryBackend::new("sessions").with_throttled_batches(10);
        fill(&table, "a", 3).await;

        let options = ClearOptions::default().with_max_unprocessed_retries(1);
        let err = clear_partition(&table, None, &options).await.unwrap_err();
        assert!(matches!(err, KvError::Unprocessed { count: 1, attempts: 2 }));
    }
}
