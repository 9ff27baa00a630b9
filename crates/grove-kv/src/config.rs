//! Table configuration

use crate::{KvError, KvResult};
use serde::{Deserialize, Serialize};

/// Table name and key attribute names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,

    /// Attribute holding the partition key
    pub partition_key: String,

    /// Attribute holding the sort key, for tables that have one
    pub sort_key: Option<String>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            partition_key: "pk".to_string(),
            sort_key: Some("sk".to_string()),
        }
    }

    pub fn with_partition_key(mut self, name: impl Into<String>) -> Self {
        self.partition_key = name.into();
        self
    }

    pub fn with_sort_key(mut self, name: impl Into<String>) -> Self {
        self.sort_key = Some(name.into());
        self
    }

    pub fn without_sort_key(mut self) -> Self {
        self.sort_key = None;
        self
    }

    pub fn validate(&self) -> KvResult<()> {
        if self.table.trim().is_empty() {
            return Err(KvError::Configuration("table name must not be empty".to_string()));
        }
        if self.partition_key.trim().is_empty() {
            return Err(KvError::Configuration(
                "partition key attribute must not be empty".to_string(),
            ));
        }
        if self.sort_key.as_deref() == Some(self.partition_key.as_str()) {
            return Err(KvError::Configuration(format!(
                "sort key attribute '{}' duplicates the partition key",
                self.partition_key
            )));
        }
        Ok(())
    }
}
