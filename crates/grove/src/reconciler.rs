//! External Resource Reconciler
//!
//! Bulk removal of artifacts held outside the relational datastore, which
//! its transactions cannot roll back. Both calls are idempotent.

use grove_kv::{KeyValueBackend, PartitionQuery};
use grove_storage::BlobBackend;

use crate::config::GroveConfig;
use crate::error::ExternalStoreError;

/// Clears blob prefixes and key-value partitions
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    blob_options: grove_storage::ClearOptions,
    kv_options: grove_kv::ClearOptions,
}

impl Reconciler {
    pub fn new(blob_options: grove_storage::ClearOptions, kv_options: grove_kv::ClearOptions) -> Self {
        Self {
            blob_options,
            kv_options,
        }
    }

    pub fn from_config(config: &GroveConfig) -> Self {
        Self::new(config.blob_clear_options(), config.kv_clear_options())
    }

    /// Delete every object under `prefix`, or the whole bucket
    #[tracing::instrument(skip(self, store), fields(bucket = %store.bucket()))]
    pub async fn clear_blob_prefix(
        &self,
        store: &dyn BlobBackend,
        prefix: Option<&str>,
    ) -> Result<grove_storage::ClearStats, ExternalStoreError> {
        grove_storage::clear_prefix(store, prefix, &self.blob_options)
            .await
            .map_err(|source| ExternalStoreError::Blob {
                bucket: store.bucket().to_string(),
                source,
            })
    }

    /// Delete every item matching `query`, or the whole table
    #[tracing::instrument(skip(self, store), fields(table = %store.table()))]
    pub async fn clear_key_value_partition(
        &self,
        store: &dyn KeyValueBackend,
        query: Option<&PartitionQuery>,
    ) -> Result<grove_kv::ClearStats, ExternalStoreError> {
        grove_kv::clear_partition(store, query, &self.kv_options)
            .await
            .map_err(|source| ExternalStoreError::KeyValue {
                table: store.table().to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_kv::{Item, ItemKey};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing::span::{Attributes, Id};
    use tracing::Subscriber;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Records the name of every span opened while installed
    #[derive(Clone, Default)]
    struct SpanNames(Arc<Mutex<Vec<String>>>);

    impl<S: Subscriber> Layer<S> for SpanNames {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            self.0.lock().push(attrs.metadata().name().to_string());
        }
    }

    #[tokio::test]
    async fn test_calls_open_reconciler_spans() {
        let names = SpanNames::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(names.clone()));

        let reconciler = Reconciler::default();
        let blobs = grove_storage::MemoryBackend::new("assets");
        let table = grove_kv::MemoryBackend::new("sessions");
        reconciler.clear_blob_prefix(&blobs, Some("users/1/")).await.unwrap();
        reconciler.clear_key_value_partition(&table, None).await.unwrap();

        let names = names.0.lock().clone();
        for expected in [
            "clear_blob_prefix",
            "clear_prefix",
            "clear_key_value_partition",
            "clear_partition",
        ] {
            assert!(names.iter().any(|n| n == expected), "{} missing from {:?}", expected, names);
        }
    }

    #[tokio::test]
    async fn test_clear_blob_prefix_uses_configured_batch_size() {
        let store = grove_storage::MemoryBackend::new("assets");
        for i in 0..12 {
            store
                .put(&format!("users/1/{:02}", i), b"x".to_vec().into())
                .await
                .unwrap();
        }

        let config = GroveConfig::default().with_blob_delete_batch_size(5);
        let stats = Reconciler::from_config(&config)
            .clear_blob_prefix(&store, Some("users/1/"))
            .await
            .unwrap();

        assert_eq!(stats.deleted, 12);
        assert_eq!(stats.batches, 3);
    }

    #[tokio::test]
    async fn test_kv_failure_maps_to_external_store_error() {
        let table = grove_kv::MemoryBackend::new("sessions").with_throttled_batches(100);
        table
            .put_item(Item::new(ItemKey::composite("u", "1")))
            .await
            .unwrap();

        let reconciler = Reconciler::new(
            grove_storage::ClearOptions::default(),
            grove_kv::ClearOptions::default().with_max_unprocessed_retries(0),
        );
        let err = reconciler
            .clear_key_value_partition(&table, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ExternalStoreError::KeyValue { ref table, .. } if table == "sessions"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_stores_are_noops() {
        let reconciler = Reconciler::default();
        let blobs = grove_storage::MemoryBackend::new("assets");
        let table = grove_kv::MemoryBackend::new("sessions");

        assert_eq!(reconciler.clear_blob_prefix(&blobs, None).await.unwrap().deleted, 0);
        assert_eq!(
            reconciler
                .clear_key_value_partition(&table, Some(&PartitionQuery::new("u")))
                .await
                .unwrap()
                .deleted,
            0
        );
    }
}
