//! Prefix clearing
//!
//! Listing pages are buffered and cut into full delete batches. The full
//! batches of a page run concurrently and are awaited together before the
//! next page is listed, so in-flight requests stay bounded by one page.

use crate::{BlobBackend, StorageResult, DEFAULT_MAX_DELETE_BATCH};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

/// Tuning for [`clear_prefix`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOptions {
    /// Keys per delete request; capped by the backend's own limit
    pub batch_size: usize,
    /// Keys requested per listing call
    pub page_size: usize,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_MAX_DELETE_BATCH,
            page_size: 1000,
        }
    }
}

impl ClearOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Outcome of a [`clear_prefix`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearStats {
    pub deleted: usize,
    pub batches: usize,
    pub pages: usize,
}

/// Delete every object under `prefix` (the whole bucket when `None`).
///
/// Callers should end prefixes with `/`: `"users/1"` also matches
/// `"users/10/..."`. An empty match is a successful no-op, and keys that
/// vanish between listing and deletion are not errors, so the call can be
/// retried as a whole.
#[tracing::instrument(skip(backend, options), fields(bucket = %backend.bucket()))]
pub async fn clear_prefix(
    backend: &dyn BlobBackend,
    prefix: Option<&str>,
    options: &ClearOptions,
) -> StorageResult<ClearStats> {
    if let Some(p) = prefix {
        if !p.is_empty() && !p.ends_with('/') {
            warn!(prefix = p, "Prefix has no trailing '/'; sibling prefixes will match too");
        }
    }

    let batch_size = options.batch_size.min(backend.max_delete_batch()).max(1);
    let page_size = options.page_size.max(1);

    let mut stats = ClearStats::default();
    let mut buffer: Vec<String> = Vec::new();
    let mut continuation: Option<String> = None;

    loop {
        let page = backend
            .list_page(prefix, continuation.as_deref(), page_size)
            .await?;
        stats.pages += 1;
        buffer.extend(page.keys);

        let full = buffer.len() / batch_size * batch_size;
        if full > 0 {
            let ready: Vec<String> = buffer.drain(..full).collect();
            stats.deleted += delete_concurrently(backend, &ready, batch_size).await?;
            stats.batches += full / batch_size;
        }

        continuation = page.continuation;
        if continuation.is_none() {
            break;
        }
    }

    if !buffer.is_empty() {
        stats.deleted += backend.delete_batch(&buffer).await?;
        stats.batches += 1;
    }

    info!(
        deleted = stats.deleted,
        batches = stats.batches,
        pages = stats.pages,
        "Cleared blob prefix"
    );
    Ok(stats)
}

async fn delete_concurrently(
    backend: &dyn BlobBackend,
    keys: &[String],
    batch_size: usize,
) -> StorageResult<usize> {
    debug!(keys = keys.len(), batch_size, "Issuing delete batches");
    let counts = try_join_all(keys.chunks(batch_size).map(|chunk| backend.delete_batch(chunk))).await?;
    Ok(counts.into_iter().sum())
}
