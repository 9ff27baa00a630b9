//! # grove-kv
//!
//! Key-value table abstraction used by seed procedures and the reset workflow.
//!
//! ## Features
//!
//! - **Composite keys**: partition key plus optional sort key
//! - **Key-only scans and partition queries** with store-native cursors
//! - **Batched deletes** that report unprocessed keys instead of failing
//! - **Partition clearing**: see [`invalidation::clear_partition`]
//!
//! ## Quick Start
//!
//! ```rust
//! use grove_kv::{clear_partition, ClearOptions, Item, ItemKey, KeyValueBackend, MemoryBackend, PartitionQuery};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let table = MemoryBackend::new("sessions");
//! table.put_item(Item::new(ItemKey::composite("user#1", "session#a"))).await.unwrap();
//! table.put_item(Item::new(ItemKey::composite("user#2", "session#b"))).await.unwrap();
//!
//! let query = PartitionQuery::new("user#1");
//! let stats = clear_partition(&table, Some(&query), &ClearOptions::default()).await.unwrap();
//! assert_eq!(stats.deleted, 1);
//! # });
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod backends;
pub mod config;
pub mod invalidation;

pub use backends::*;
pub use config::*;
pub use invalidation::*;

/// Bulk-delete limit of DynamoDB-style stores
pub const DEFAULT_MAX_BATCH_DELETE: usize = 25;

/// Key-value operation errors
#[derive(Error, Debug)]
pub enum KvError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{count} keys were still unprocessed after {attempts} delete attempts")]
    Unprocessed { count: usize, attempts: usize },
}

/// Result type for key-value operations
pub type KvResult<T> = Result<T, KvError>;

/// Primary key of an item. Ordered by partition, then sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub partition: String,
    pub sort: Option<String>,
}

impl ItemKey {
    /// Key of a table without a sort key
    pub fn partition(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    pub fn composite(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "{}/{}", self.partition, sort),
            None => write!(f, "{}", self.partition),
        }
    }
}

/// A stored item: its key plus free-form attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: ItemKey,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Item {
    pub fn new(key: ItemKey) -> Self {
        Self {
            key,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Serialize) -> KvResult<Self> {
        self.attributes.insert(name.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

/// Selects the items of one partition, optionally narrowed by a sort-key prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionQuery {
    pub partition: String,
    pub sort_prefix: Option<String>,
}

impl PartitionQuery {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort_prefix: None,
        }
    }

    pub fn with_sort_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, key: &ItemKey) -> bool {
        if key.partition != self.partition {
            return false;
        }
        match (&self.sort_prefix, &key.sort) {
            (None, _) => true,
            (Some(prefix), Some(sort)) => sort.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        }
    }
}

/// One page of keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPage {
    pub keys: Vec<ItemKey>,
    /// Resume point for the next page; `None` once exhausted
    pub cursor: Option<ItemKey>,
}

/// Key-value backend scoped to a single table
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Table this backend operates on
    fn table(&self) -> &str;

    async fn put_item(&self, item: Item) -> KvResult<()>;

    async fn get_item(&self, key: &ItemKey) -> KvResult<Option<Item>>;

    /// Scan the whole table, projecting keys only
    async fn scan_keys(&self, cursor: Option<&ItemKey>, limit: usize) -> KvResult<KeyPage>;

    /// Keys matching `query`, projecting keys only
    async fn query_keys(
        &self,
        query: &PartitionQuery,
        cursor: Option<&ItemKey>,
        limit: usize,
    ) -> KvResult<KeyPage>;

    /// Delete up to [`max_batch_delete`](Self::max_batch_delete) keys in one call.
    /// Returns the keys the store did not process. Absent keys are not errors.
    async fn batch_delete(&self, keys: &[ItemKey]) -> KvResult<Vec<ItemKey>>;

    fn max_batch_delete(&self) -> usize {
        DEFAULT_MAX_BATCH_DELETE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering() {
        let mut keys = vec![
            ItemKey::composite("b", "1"),
            ItemKey::composite("a", "2"),
            ItemKey::partition("a"),
            ItemKey::composite("a", "1"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ItemKey::partition("a"),
                ItemKey::composite("a", "1"),
                ItemKey::composite("a", "2"),
                ItemKey::composite("b", "1"),
            ]
        );
    }

    #[test]
    fn test_partition_query_matching() {
        let query = PartitionQuery::new("user#1").with_sort_prefix("session#");
        assert!(query.matches(&ItemKey::composite("user#1", "session#a")));
        assert!(!query.matches(&ItemKey::composite("user#1", "profile")));
        assert!(!query.matches(&ItemKey::composite("user#10", "session#a")));
        assert!(!query.matches(&ItemKey::partition("user#1")));
        assert!(PartitionQuery::new("user#1").matches(&ItemKey::partition("user#1")));
    }

    #[test]
    fn test_item_attributes() {
        let item = Item::new(ItemKey::partition("k"))
            .with_attribute("count", 3)
            .unwrap();
        assert_eq!(item.attribute("count"), Some(&serde_json::json!(3)));
        assert_eq!(ItemKey::composite("p", "s").to_string(), "p/s");
    }
}
