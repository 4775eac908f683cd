//! Live task synchronization controller.
//!
//! [`TaskSync`] drives one view's lifecycle against the store:
//!
//! ```text
//! Uninitialized → Seeding → Loading → Ready (error: none | set)
//! ```
//!
//! 1. **Seeding**: write the fixed task set if the store is empty. A
//!    failure sets the error flag and initialization continues.
//! 2. **Loading**: one initial list fetch through the cache policy of
//!    [`cache::loader`](crate::cache::loader); a failed fetch keeps any
//!    cached list and sets the error flag.
//! 3. **Ready**: exactly one subscription is open. Each push replaces the
//!    list, rewrites the shared cache, stamps `last_sync` and clears the
//!    error flag. Subscription errors only set the flag.
//!
//! State is published through a [`watch`] channel; any number of views can
//! hold a receiver.
//!
//! # Mutations
//!
//! Writes are optimistic: the cache and the published list are patched
//! before the store call, and stay patched if the call fails. The next push
//! reconciles any divergence. Mutations are not serialized: concurrent
//! writes to one id are last-write-wins at the store, and each call is
//! counted separately in [`SyncState::updating`].
//!
//! # Teardown
//!
//! [`TaskSync::deactivate`] (or drop) clears the active flag before
//! unsubscribing. Pushes and in-flight mutation results that land after
//! that are discarded.

mod state;

pub use state::{SyncPhase, SyncState};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cache::SyncCache;
use crate::cache::loader::{LoadMode, LoadResult, LoadSource, load_tasks};
use crate::error::ErrorCode;
use crate::model::{Status, Task, TaskPatch};
use crate::remote::{DocumentStore, StoreError};
use crate::store::{PatchMode, SeedOutcome, Subscription, TaskStore};

/// Default maximum age of a cached list served without fetching.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Errors surfaced to callers of [`TaskSync`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A write did not reach the store. The optimistic change is kept.
    #[error("operation failed, please retry")]
    MutationFailed {
        id: String,
        #[source]
        source: StoreError,
    },

    /// A forced reload failed and there was no cached list.
    #[error("failed to load tasks: {0}")]
    Load(#[source] StoreError),

    /// The controller was never activated or has been torn down.
    #[error("sync controller is not active")]
    NotActive,
}

impl SyncError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MutationFailed { .. } => ErrorCode::MutationFailed,
            Self::Load(source) => source.code(),
            Self::NotActive => ErrorCode::ControllerInactive,
        }
    }

    /// The underlying store failure, if any.
    #[must_use]
    pub const fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::MutationFailed { source, .. } | Self::Load(source) => Some(source),
            Self::NotActive => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_not_found)
    }
}

/// Tunables for [`TaskSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub cache_ttl: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// State shared with subscription callbacks.
struct Shared {
    state: watch::Sender<SyncState>,
    active: AtomicBool,
    cache: Arc<SyncCache>,
}

impl Shared {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn apply_push(&self, tasks: Vec<Task>) {
        if !self.is_active() {
            tracing::debug!("dropping push received after teardown");
            return;
        }
        tracing::debug!(count = tasks.len(), "subscription push");
        self.cache.write(tasks.clone());
        self.state.send_modify(|state| {
            state.tasks = tasks;
            state.last_sync = Some(Utc::now());
            state.loading = false;
            state.error = None;
        });
    }

    fn apply_push_error(&self, error: &StoreError) {
        if !self.is_active() {
            return;
        }
        tracing::warn!("subscription error: {error}");
        let message = error.to_string();
        self.state.send_modify(|state| state.error = Some(message));
    }

    fn apply_load(&self, outcome: &Result<LoadResult, StoreError>) {
        self.state.send_modify(|state| {
            match outcome {
                Ok(result) => {
                    state.tasks.clone_from(&result.tasks);
                    match &result.source {
                        LoadSource::Remote => state.last_sync = Some(Utc::now()),
                        LoadSource::Cache => {}
                        LoadSource::StaleFallback(error) => state.error = Some(error.to_string()),
                    }
                }
                Err(error) => state.error = Some(error.to_string()),
            }
            state.loading = false;
            state.phase = SyncPhase::Ready;
        });
    }
}

enum Mutation {
    Patch(TaskPatch),
    Status {
        status: Status,
        actual_hours: Option<f64>,
        findings: Option<String>,
    },
    Delete,
}

/// Reactive lifecycle manager for one view of the task list.
pub struct TaskSync<D> {
    store: TaskStore<D>,
    options: SyncOptions,
    shared: Arc<Shared>,
    subscription: Mutex<Option<Subscription>>,
}

impl<D: DocumentStore> TaskSync<D> {
    /// Create an inactive controller sharing `cache`.
    pub fn new(store: TaskStore<D>, cache: Arc<SyncCache>, options: SyncOptions) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            store,
            options,
            shared: Arc::new(Shared {
                state,
                active: AtomicBool::new(false),
                cache,
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Seed, load and subscribe.
    ///
    /// Idempotent: calling it on an active controller does nothing, so at
    /// most one subscription is ever open. Failures are reflected in the
    /// error flag rather than returned.
    pub async fn activate(&self) {
        if self
            .shared
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("activate on an active controller ignored");
            return;
        }

        self.set_phase(SyncPhase::Seeding);
        match self.store.seed_if_empty(false).await {
            Ok(SeedOutcome::Seeded { written, .. }) => {
                tracing::info!(written, "store was empty, initial tasks written");
            }
            Ok(SeedOutcome::Skipped) => {}
            Err(error) => {
                tracing::warn!("seeding failed, continuing with existing data: {error}");
                let message = format!("seeding failed: {error}");
                self.shared.state.send_modify(|state| state.error = Some(message));
            }
        }
        if !self.shared.is_active() {
            return;
        }

        self.set_phase(SyncPhase::Loading);
        let outcome = load_tasks(
            &self.store,
            &self.shared.cache,
            self.options.cache_ttl,
            LoadMode::PreferCache,
        )
        .await;
        if !self.shared.is_active() {
            return;
        }
        self.shared.apply_load(&outcome);

        self.open_subscription().await;
        tracing::info!(tasks = self.shared.state.borrow().tasks.len(), "task sync ready");
    }

    async fn open_subscription(&self) {
        let on_push = Arc::clone(&self.shared);
        let on_error = Arc::clone(&self.shared);
        let opened = self
            .store
            .subscribe(
                move |tasks| on_push.apply_push(tasks),
                move |error| on_error.apply_push_error(&error),
            )
            .await;

        match opened {
            Ok(mut subscription) => {
                if self.shared.is_active() {
                    *self.subscription.lock() = Some(subscription);
                } else {
                    subscription.unsubscribe();
                }
            }
            Err(error) => {
                tracing::warn!("could not open task subscription: {error}");
                let message = error.to_string();
                self.shared.state.send_modify(|state| state.error = Some(message));
            }
        }
    }

    /// Tear down: stop applying results, then unsubscribe once.
    ///
    /// Returns `false` if the controller was not active.
    pub fn deactivate(&self) -> bool {
        if !self.shared.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(mut subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
        tracing::debug!("task sync deactivated");
        true
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Whether a live subscription is held.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Re-fetch bypassing the cache TTL. The subscription is untouched.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotActive`] after teardown, or [`SyncError::Load`] when
    /// the fetch fails and nothing is cached. A failure with a cached list
    /// succeeds with [`LoadSource::StaleFallback`].
    pub async fn refresh(&self) -> Result<LoadSource, SyncError> {
        if !self.shared.is_active() {
            return Err(SyncError::NotActive);
        }
        self.shared.state.send_modify(|state| state.loading = true);
        let outcome = load_tasks(
            &self.store,
            &self.shared.cache,
            self.options.cache_ttl,
            LoadMode::Force,
        )
        .await;
        if !self.shared.is_active() {
            return Err(SyncError::NotActive);
        }
        self.shared.apply_load(&outcome);
        outcome.map(|result| result.source).map_err(SyncError::Load)
    }

    /// Set a task's status.
    ///
    /// # Errors
    ///
    /// [`SyncError::MutationFailed`] when the store rejects the write; the
    /// optimistic change stays in place. A patch with invalid hours fails
    /// the same way before anything local changes.
    pub async fn update_status(&self, id: &str, status: Status) -> Result<(), SyncError> {
        self.update_status_with(id, status, None, None).await
    }

    /// Set a task's status along with actual hours and findings.
    ///
    /// # Errors
    ///
    /// As [`update_status`](Self::update_status).
    pub async fn update_status_with(
        &self,
        id: &str,
        status: Status,
        actual_hours: Option<f64>,
        findings: Option<String>,
    ) -> Result<(), SyncError> {
        let mutation = Mutation::Status {
            status,
            actual_hours,
            findings,
        };
        self.mutate(id, mutation).await
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// As [`update_status`](Self::update_status).
    pub async fn update_partial(&self, id: &str, patch: TaskPatch) -> Result<(), SyncError> {
        self.mutate(id, Mutation::Patch(patch)).await
    }

    /// Delete a task from the store and the local list.
    ///
    /// # Errors
    ///
    /// As [`update_status`](Self::update_status).
    pub async fn delete_task(&self, id: &str) -> Result<(), SyncError> {
        self.mutate(id, Mutation::Delete).await
    }

    async fn mutate(&self, id: &str, mutation: Mutation) -> Result<(), SyncError> {
        if !self.shared.is_active() {
            return Err(SyncError::NotActive);
        }

        let optimistic = match &mutation {
            Mutation::Patch(patch) => Some(patch.clone()),
            Mutation::Status {
                status,
                actual_hours,
                findings,
            } => Some(TaskPatch::status_with(*status, *actual_hours, findings.clone())),
            Mutation::Delete => None,
        };
        if let Some(Err(invalid)) = optimistic.as_ref().map(TaskPatch::validate) {
            tracing::warn!(id, "rejected patch before write: {invalid}");
            return Err(SyncError::MutationFailed {
                id: id.to_string(),
                source: StoreError::InvalidDocument {
                    id: id.to_string(),
                    reason: invalid.to_string(),
                },
            });
        }
        match &optimistic {
            Some(patch) => {
                self.shared.cache.patch_one(id, patch);
            }
            None => {
                self.shared.cache.remove_one(id);
            }
        }
        self.shared.state.send_modify(|state| {
            state.begin_update(id);
            match &optimistic {
                Some(patch) => {
                    if let Some(task) = state.tasks.iter_mut().find(|task| task.id == id) {
                        patch.apply_to(task);
                    }
                }
                None => state.tasks.retain(|task| task.id != id),
            }
        });

        let result = match mutation {
            Mutation::Patch(patch) => self.store.patch_task(id, &patch, PatchMode::Update).await,
            Mutation::Status {
                status,
                actual_hours,
                findings,
            } => {
                self.store
                    .replace_status(id, status, actual_hours, findings)
                    .await
            }
            Mutation::Delete => self.store.delete_task(id).await,
        };

        // Pairs with begin_update even after teardown, so a re-activated
        // controller never reports a finished write as in flight.
        self.shared.state.send_modify(|state| state.end_update(id));

        result.map_err(|source| {
            tracing::warn!(id, "mutation failed, keeping optimistic change: {source}");
            SyncError::MutationFailed {
                id: id.to_string(),
                source,
            }
        })
    }

    fn set_phase(&self, phase: SyncPhase) {
        tracing::debug!(%phase, "task sync phase");
        self.shared.state.send_modify(|state| {
            state.phase = phase;
            state.loading = true;
        });
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.shared.state.borrow().tasks.clone()
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.shared.state.borrow().phase
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.shared.state.borrow().error.clone()
    }

    #[must_use]
    pub fn last_sync(&self) -> Option<chrono::DateTime<Utc>> {
        self.shared.state.borrow().last_sync
    }

    #[must_use]
    pub fn is_updating(&self, id: &str) -> bool {
        self.shared.state.borrow().is_updating(id)
    }

    /// The shared cache this controller reads and writes.
    #[must_use]
    pub fn cache(&self) -> &Arc<SyncCache> {
        &self.shared.cache
    }

    #[must_use]
    pub const fn store(&self) -> &TaskStore<D> {
        &self.store
    }
}

impl<D> Drop for TaskSync<D> {
    fn drop(&mut self) {
        if self.shared.active.swap(false, Ordering::SeqCst)
            && let Some(mut subscription) = self.subscription.lock().take()
        {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryDocumentStore;

    fn controller() -> (Arc<MemoryDocumentStore>, TaskSync<MemoryDocumentStore>) {
        let remote = Arc::new(MemoryDocumentStore::new());
        let store = TaskStore::new(Arc::clone(&remote));
        let sync = TaskSync::new(store, Arc::new(SyncCache::new()), SyncOptions::default());
        (remote, sync)
    }

    #[tokio::test]
    async fn activation_reaches_ready_with_one_subscription() {
        let (remote, sync) = controller();
        assert_eq!(sync.phase(), SyncPhase::Uninitialized);

        sync.activate().await;
        let state = sync.state();
        assert_eq!(state.phase, SyncPhase::Ready);
        assert_eq!(state.tasks.len(), 20);
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert!(state.last_sync.is_some());
        assert_eq!(remote.listener_count(), 1);

        sync.activate().await;
        assert_eq!(remote.listener_count(), 1);
    }

    #[tokio::test]
    async fn deactivate_unsubscribes_exactly_once() {
        let (remote, sync) = controller();
        sync.activate().await;
        assert!(sync.deactivate());
        assert!(!sync.deactivate());
        assert_eq!(remote.listener_count(), 0);
        assert!(!sync.is_subscribed());
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let (remote, sync) = controller();
        sync.activate().await;
        drop(sync);
        assert_eq!(remote.listener_count(), 0);
    }

    #[tokio::test]
    async fn mutations_require_activation() {
        let (_remote, sync) = controller();
        let err = sync.update_status("task_001", Status::Completed).await.unwrap_err();
        assert!(matches!(err, SyncError::NotActive));
        assert!(matches!(sync.refresh().await, Err(SyncError::NotActive)));
    }

    #[test]
    fn mutation_failure_reads_as_retry_prompt() {
        let err = SyncError::MutationFailed {
            id: "task_001".into(),
            source: StoreError::Unavailable("offline".into()),
        };
        assert_eq!(err.to_string(), "operation failed, please retry");
        assert_eq!(err.code(), ErrorCode::MutationFailed);
        assert!(!err.is_not_found());
    }
}
