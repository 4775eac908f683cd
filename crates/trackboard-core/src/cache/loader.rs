//! Fetch policy over [`SyncCache`]: fresh cache, then remote, then stale
//! fallback.

use std::time::Duration;

use crate::cache::SyncCache;
use crate::model::Task;
use crate::remote::{DocumentStore, StoreError};
use crate::store::TaskStore;

/// Whether a fresh cache entry may satisfy the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Serve a cache entry younger than the TTL without fetching.
    PreferCache,
    /// Always fetch (manual "sync now").
    Force,
}

/// Where the tasks of a [`LoadResult`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// A fresh cache entry.
    Cache,
    /// A successful remote fetch. The cache was rewritten.
    Remote,
    /// The fetch failed; the last good cache was served instead.
    StaleFallback(StoreError),
}

/// Outcome of [`load_tasks`].
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub tasks: Vec<Task>,
    pub source: LoadSource,
}

impl LoadResult {
    /// The fetch error hidden behind a stale fallback, if any.
    #[must_use]
    pub const fn fallback_error(&self) -> Option<&StoreError> {
        match &self.source {
            LoadSource::StaleFallback(error) => Some(error),
            _ => None,
        }
    }
}

/// Load the ordered task list.
///
/// 1. In [`LoadMode::PreferCache`], return a cache entry younger than `ttl`.
/// 2. Fetch from the store; on success rewrite the cache.
/// 3. On fetch failure, return the cached list of any age.
///
/// # Errors
///
/// Returns the fetch error only when there is no cached list to fall back to.
pub async fn load_tasks<D: DocumentStore>(
    store: &TaskStore<D>,
    cache: &SyncCache,
    ttl: Duration,
    mode: LoadMode,
) -> Result<LoadResult, StoreError> {
    if mode == LoadMode::PreferCache
        && let Some(tasks) = cache.read(ttl)
    {
        return Ok(LoadResult {
            tasks,
            source: LoadSource::Cache,
        });
    }

    match store.list_tasks(None).await {
        Ok(tasks) => {
            cache.write(tasks.clone());
            Ok(LoadResult {
                tasks,
                source: LoadSource::Remote,
            })
        }
        Err(error) => match cache.read_stale() {
            Some(tasks) => {
                tracing::warn!(cached = tasks.len(), "task fetch failed, serving cached list: {error}");
                Ok(LoadResult {
                    tasks,
                    source: LoadSource::StaleFallback(error),
                })
            }
            None => Err(error),
        },
    }
}
