//! Session-scoped cache of the full task list.
//!
//! [`SyncCache`] holds the last known ordered task list and the instant it
//! was fetched. It is shared (via `Arc`) by every controller of one app
//! session: a refresh or optimistic patch from any of them is visible to
//! all. Readers ask for a maximum age; optimistic patches edit entries in
//! place without counting as a fresh fetch.
//!
//! [`loader`] layers the fetch policy on top: prefer a fresh cache, fetch
//! otherwise, and fall back to a stale cache rather than failing.
//!
//! # Races
//!
//! Subscription pushes and manual refreshes both [`write`](SyncCache::write)
//! here and the last write wins. A slow refresh can overwrite a newer push;
//! the next push corrects it.

pub mod loader;

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::model::{Task, TaskPatch};

#[derive(Debug, Clone)]
struct CacheEntry {
    tasks: Vec<Task>,
    cached_at: Instant,
}

/// The shared snapshot of the task list plus its freshness instant.
#[derive(Debug, Default)]
pub struct SyncCache {
    entry: Mutex<Option<CacheEntry>>,
}

impl SyncCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached list if it is younger than `ttl`.
    #[must_use]
    pub fn read(&self, ttl: Duration) -> Option<Vec<Task>> {
        let entry = self.entry.lock();
        let entry = entry.as_ref()?;
        if entry.cached_at.elapsed() < ttl {
            tracing::debug!(count = entry.tasks.len(), "task cache hit");
            Some(entry.tasks.clone())
        } else {
            tracing::debug!("task cache expired");
            None
        }
    }

    /// The cached list regardless of age.
    #[must_use]
    pub fn read_stale(&self) -> Option<Vec<Task>> {
        self.entry.lock().as_ref().map(|entry| entry.tasks.clone())
    }

    /// Replace the whole list and reset its age.
    pub fn write(&self, tasks: Vec<Task>) {
        tracing::debug!(count = tasks.len(), "task cache written");
        *self.entry.lock() = Some(CacheEntry {
            tasks,
            cached_at: Instant::now(),
        });
    }

    /// Apply `patch` to the cached task `id` in place. Returns whether the
    /// task was cached. The entry's age is unchanged.
    pub fn patch_one(&self, id: &str, patch: &TaskPatch) -> bool {
        let mut entry = self.entry.lock();
        let Some(task) = entry
            .as_mut()
            .and_then(|entry| entry.tasks.iter_mut().find(|task| task.id == id))
        else {
            return false;
        };
        patch.apply_to(task);
        true
    }

    /// Drop the cached task `id`. Returns whether it was cached.
    pub fn remove_one(&self, id: &str) -> bool {
        let mut entry = self.entry.lock();
        let Some(entry) = entry.as_mut() else {
            return false;
        };
        let before = entry.tasks.len();
        entry.tasks.retain(|task| task.id != id);
        entry.tasks.len() != before
    }

    /// Forget everything.
    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }

    /// Time since the last full write.
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        self.entry.lock().as_ref().map(|entry| entry.cached_at.elapsed())
    }
}
