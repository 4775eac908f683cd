//! Typed task operations over a [`DocumentStore`].
//!
//! [`TaskStore`] owns the connection to the `tasks` collection and nothing
//! else: it never caches, and every mutation touches only the remote store.
//! Every mutation stamps `lastUpdated` with the store's own clock.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::model::seed::initial_tasks;
use crate::model::{NewTask, Status, Task, TaskPatch};
use crate::remote::{
    BatchOp, DocumentSnapshot, DocumentStore, FieldValue, ListenerRegistration, Query, SetMode,
    SnapshotListener, StoreError, WriteFields, literal_fields,
};

/// Collection holding task documents.
pub const TASKS_COLLECTION: &str = "tasks";

/// Field defining canonical order.
pub const ORDER_FIELD: &str = "day";

const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// How [`TaskStore::patch_task`] treats a missing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// Fail with [`StoreError::NotFound`].
    Update,
    /// Create the document from the patch fields.
    MergeCreate,
}

/// Result of [`TaskStore::seed_if_empty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Tasks already existed and the caller did not force.
    Skipped,
    /// The fixed set was written.
    Seeded { written: usize, batches: usize },
}

/// Live task subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    registration: ListenerRegistration,
}

impl Subscription {
    /// Stop receiving pushes. Returns `false` if already unsubscribed.
    pub fn unsubscribe(&mut self) -> bool {
        self.registration.remove()
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.registration.is_active()
    }
}

/// Client for the task collection.
pub struct TaskStore<D> {
    remote: Arc<D>,
    collection: String,
    batch_limit: usize,
}

impl<D> Clone for TaskStore<D> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            collection: self.collection.clone(),
            batch_limit: self.batch_limit,
        }
    }
}

impl<D: DocumentStore> TaskStore<D> {
    pub fn new(remote: Arc<D>) -> Self {
        Self {
            remote,
            collection: TASKS_COLLECTION.to_string(),
            batch_limit: usize::MAX,
        }
    }

    /// Use a different collection name.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Cap seeding batches below the store's own ceiling.
    #[must_use]
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn remote(&self) -> &Arc<D> {
        &self.remote
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// All tasks ordered by day, optionally limited.
    ///
    /// # Errors
    ///
    /// Propagates the store failure; choosing a fallback is the caller's job.
    pub async fn list_tasks(&self, limit: Option<usize>) -> Result<Vec<Task>, StoreError> {
        let mut query = Query::ordered_by(ORDER_FIELD);
        query.limit = limit;
        let docs = self.remote.list(&self.collection, &query).await?;
        Ok(decode_all(&docs))
    }

    /// One page of tasks ordered by day, starting after `start_after_day`.
    ///
    /// # Errors
    ///
    /// Propagates the store failure.
    pub async fn list_page(
        &self,
        limit: usize,
        start_after_day: Option<u32>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut query = Query::ordered_by(ORDER_FIELD).limit(limit);
        if let Some(day) = start_after_day {
            query = query.start_after(day);
        }
        let docs = self.remote.list(&self.collection, &query).await?;
        Ok(decode_all(&docs))
    }

    /// Point read by id.
    ///
    /// # Errors
    ///
    /// Store failures, or [`StoreError::InvalidDocument`] when the stored
    /// fields do not decode.
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let Some(doc) = self.remote.get(&self.collection, id).await? else {
            return Ok(None);
        };
        Task::from_document(&doc.id, &doc.data)
            .map(Some)
            .map_err(|e| StoreError::InvalidDocument {
                id: doc.id.clone(),
                reason: e.to_string(),
            })
    }

    /// Whether at least one task exists.
    ///
    /// # Errors
    ///
    /// Propagates the store failure.
    pub async fn has_tasks(&self) -> Result<bool, StoreError> {
        self.remote.exists(&self.collection).await
    }

    /// Write the fixed initial task set unless tasks already exist.
    ///
    /// With `force`, the set is written even if tasks exist, overwriting the
    /// seeded ids. Records share one timestamp captured before the first
    /// batch, and batches never exceed the store ceiling.
    ///
    /// # Errors
    ///
    /// Store failures. A failure in a later batch leaves earlier batches
    /// committed.
    pub async fn seed_if_empty(&self, force: bool) -> Result<SeedOutcome, StoreError> {
        if !force && self.has_tasks().await? {
            tracing::debug!(collection = %self.collection, "tasks present, skipping seed");
            return Ok(SeedOutcome::Skipped);
        }

        let tasks = initial_tasks(Utc::now());
        let chunk = self.remote.max_batch_size().min(self.batch_limit).max(1);
        let mut written = 0;
        let mut batches = 0;
        for group in tasks.chunks(chunk) {
            let ops = group
                .iter()
                .map(|task| -> Result<BatchOp, StoreError> {
                    Ok(BatchOp::Set {
                        id: task.id.clone(),
                        fields: literal_fields(encode(task)?),
                        mode: SetMode::Replace,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.remote.commit(&self.collection, ops).await?;
            written += group.len();
            batches += 1;
        }
        tracing::info!(written, batches, force, "seeded initial task set");
        Ok(SeedOutcome::Seeded { written, batches })
    }

    /// Create a task under a store-assigned id and return it as stored.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let mut fields = WriteFields::new();
        let data = serde_json::to_value(&new).map_err(|e| StoreError::InvalidDocument {
            id: String::new(),
            reason: e.to_string(),
        })?;
        if let Value::Object(map) = data {
            fields.extend(literal_fields(map));
        }
        fields.insert("status".into(), FieldValue::Value(Value::from(Status::Pending.as_str())));
        fields.insert("order".into(), FieldValue::Value(Value::from(new.day)));
        fields.insert("createdAt".into(), FieldValue::ServerTimestamp);
        fields.insert(LAST_UPDATED_FIELD.into(), FieldValue::ServerTimestamp);

        let id = self.remote.add(&self.collection, fields).await?;
        self.get_task(&id).await?.ok_or_else(|| StoreError::NotFound {
            collection: self.collection.clone(),
            id,
        })
    }

    /// Write the fields of `patch`, stamping `lastUpdated`.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidDocument`] if the patch fails validation,
    /// [`StoreError::NotFound`] in [`PatchMode::Update`] when absent, or any
    /// store failure.
    pub async fn patch_task(
        &self,
        id: &str,
        patch: &TaskPatch,
        mode: PatchMode,
    ) -> Result<(), StoreError> {
        patch.validate().map_err(|e| StoreError::InvalidDocument {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        let mut fields = literal_fields(patch.to_fields());
        fields.insert(LAST_UPDATED_FIELD.into(), FieldValue::ServerTimestamp);

        match mode {
            PatchMode::Update => self.remote.update(&self.collection, id, fields).await,
            PatchMode::MergeCreate => {
                self.remote
                    .set(&self.collection, id, fields, SetMode::Merge)
                    .await
            }
        }
    }

    /// Change status, optionally recording actual hours and findings.
    ///
    /// # Errors
    ///
    /// As [`patch_task`](Self::patch_task) in update mode.
    pub async fn replace_status(
        &self,
        id: &str,
        status: Status,
        actual_hours: Option<f64>,
        findings: Option<String>,
    ) -> Result<(), StoreError> {
        let patch = TaskPatch::status_with(status, actual_hours, findings);
        self.patch_task(id, &patch, PatchMode::Update).await
    }

    /// Delete a task.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        self.remote.delete(&self.collection, id).await
    }

    /// Open one live day-ordered subscription.
    ///
    /// `on_change` receives the full ordered list on every change (the first
    /// call carries the current state). `on_error` reports listener errors;
    /// the subscription stays open.
    ///
    /// # Errors
    ///
    /// Fails if the listener cannot be registered.
    pub async fn subscribe<F, E>(&self, on_change: F, on_error: E) -> Result<Subscription, StoreError>
    where
        F: Fn(Vec<Task>) + Send + Sync + 'static,
        E: Fn(StoreError) + Send + Sync + 'static,
    {
        let listener = Arc::new(TaskListener { on_change, on_error });
        let registration = self
            .remote
            .listen(&self.collection, Query::ordered_by(ORDER_FIELD), listener)
            .await?;
        Ok(Subscription { registration })
    }
}

struct TaskListener<F, E> {
    on_change: F,
    on_error: E,
}

impl<F, E> SnapshotListener for TaskListener<F, E>
where
    F: Fn(Vec<Task>) + Send + Sync,
    E: Fn(StoreError) + Send + Sync,
{
    fn on_snapshot(&self, documents: Vec<DocumentSnapshot>) {
        (self.on_change)(decode_all(&documents));
    }

    fn on_error(&self, error: StoreError) {
        (self.on_error)(error);
    }
}

fn encode(task: &Task) -> Result<serde_json::Map<String, Value>, StoreError> {
    task.to_document().map_err(|e| StoreError::InvalidDocument {
        id: task.id.clone(),
        reason: e.to_string(),
    })
}

/// Decode documents, skipping any that do not parse as tasks.
fn decode_all(docs: &[DocumentSnapshot]) -> Vec<Task> {
    docs.iter()
        .filter_map(|doc| match Task::from_document(&doc.id, &doc.data) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!(id = %doc.id, "skipping undecodable task document: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Priority};
    use crate::remote::memory::MemoryDocumentStore;
    use parking_lot::Mutex;
    use serde_json::json;

    fn client() -> (Arc<MemoryDocumentStore>, TaskStore<MemoryDocumentStore>) {
        let remote = Arc::new(MemoryDocumentStore::new());
        (Arc::clone(&remote), TaskStore::new(remote))
    }

    #[tokio::test]
    async fn seeding_writes_twenty_ordered_tasks() {
        let (_remote, store) = client();
        let outcome = store.seed_if_empty(false).await.unwrap();
        assert_eq!(outcome, SeedOutcome::Seeded { written: 20, batches: 1 });

        let tasks = store.list_tasks(None).await.unwrap();
        let days: Vec<u32> = tasks.iter().map(|t| t.day).collect();
        assert_eq!(days, (1..=20).collect::<Vec<_>>());
        let stamp = tasks[0].created_at;
        assert!(tasks.iter().all(|t| t.created_at == stamp && t.last_updated == stamp));
    }

    #[tokio::test]
    async fn seeding_twice_is_a_no_op() {
        let (remote, store) = client();
        store.seed_if_empty(false).await.unwrap();
        let before = store.list_tasks(None).await.unwrap();
        let writes = remote.write_count();

        assert_eq!(store.seed_if_empty(false).await.unwrap(), SeedOutcome::Skipped);
        assert_eq!(remote.write_count(), writes);
        assert_eq!(store.list_tasks(None).await.unwrap(), before);
    }

    #[tokio::test]
    async fn seeding_chunks_to_the_batch_ceiling() {
        let remote = Arc::new(MemoryDocumentStore::new().with_max_batch(8));
        let store = TaskStore::new(remote);
        let outcome = store.seed_if_empty(false).await.unwrap();
        assert_eq!(outcome, SeedOutcome::Seeded { written: 20, batches: 3 });
        assert_eq!(store.list_tasks(None).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn configured_batch_limit_also_bounds_chunks() {
        let (_remote, store) = client();
        let store = store.with_batch_limit(5);
        let outcome = store.seed_if_empty(true).await.unwrap();
        assert_eq!(outcome, SeedOutcome::Seeded { written: 20, batches: 4 });
    }

    #[tokio::test]
    async fn list_limit_and_pages() {
        let (_remote, store) = client();
        store.seed_if_empty(false).await.unwrap();
        assert_eq!(store.list_tasks(Some(3)).await.unwrap().len(), 3);

        let page = store.list_page(5, Some(5)).await.unwrap();
        let days: Vec<u32> = page.iter().map(|t| t.day).collect();
        assert_eq!(days, vec![6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn patch_round_trip_refreshes_last_updated() {
        let (_remote, store) = client();
        store.seed_if_empty(false).await.unwrap();
        let before = store.get_task("task_003").await.unwrap().unwrap();

        let patch = TaskPatch {
            title: Some(before.title.clone()),
            assignee: Some(Some("rafa".to_string())),
            ..TaskPatch::default()
        };
        store.patch_task("task_003", &patch, PatchMode::Update).await.unwrap();
        let after = store.get_task("task_003").await.unwrap().unwrap();

        assert!(after.last_updated > before.last_updated);
        let mut expected = before.clone();
        expected.assignee = Some("rafa".to_string());
        expected.last_updated = after.last_updated;
        assert_eq!(after, expected);
    }

    #[tokio::test]
    async fn update_mode_fails_for_missing_task() {
        let (remote, store) = client();
        let err = store
            .replace_status("task_404", Status::Completed, None, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(remote.raw_document(TASKS_COLLECTION, "task_404").is_none());
    }

    #[tokio::test]
    async fn merge_create_creates_missing_task() {
        let (remote, store) = client();
        let patch = TaskPatch {
            status: Some(Status::Blocked),
            ..TaskPatch::default()
        };
        store
            .patch_task("scratch", &patch, PatchMode::MergeCreate)
            .await
            .unwrap();
        let doc = remote.raw_document(TASKS_COLLECTION, "scratch").unwrap();
        assert_eq!(doc["status"], json!("blocked"));
        assert!(doc.contains_key(LAST_UPDATED_FIELD));
    }

    #[tokio::test]
    async fn invalid_patch_is_rejected_before_writing() {
        let (remote, store) = client();
        store.seed_if_empty(false).await.unwrap();
        let writes = remote.write_count();
        let patch = TaskPatch {
            actual_hours: Some(Some(-2.0)),
            ..TaskPatch::default()
        };
        let err = store
            .patch_task("task_001", &patch, PatchMode::Update)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument { .. }));
        assert_eq!(remote.write_count(), writes);
    }

    #[tokio::test]
    async fn replace_status_records_companions() {
        let (_remote, store) = client();
        store.seed_if_empty(false).await.unwrap();
        store
            .replace_status("task_007", Status::Completed, Some(5.5), Some("all green".into()))
            .await
            .unwrap();
        let task = store.get_task("task_007").await.unwrap().unwrap();
        assert_eq!(task.status, Status::Completed);
        assert_eq!(task.actual_hours, Some(5.5));
        assert_eq!(task.findings.as_deref(), Some("all green"));
    }

    #[tokio::test]
    async fn create_and_delete() {
        let (_remote, store) = client();
        let task = store
            .create_task(NewTask {
                day: 21,
                title: "Post-launch review".into(),
                module: "Release".into(),
                priority: Priority::Low,
                category: Category::Documentation,
                description: String::new(),
                estimated_hours: 2.0,
                assignee: None,
                tags: vec!["retro".into()],
            })
            .await
            .unwrap();
        assert_eq!(task.status, Status::Pending);
        assert_eq!(task.order, 21);

        store.delete_task(&task.id).await.unwrap();
        assert!(store.get_task(&task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn undecodable_documents_are_skipped() {
        let (remote, store) = client();
        store.seed_if_empty(false).await.unwrap();
        remote.insert_raw(
            TASKS_COLLECTION,
            "junk",
            json!({ "day": 99, "status": "unknown" }).as_object().cloned().unwrap(),
        );
        assert_eq!(store.list_tasks(None).await.unwrap().len(), 20);
        assert!(matches!(
            store.get_task("junk").await,
            Err(StoreError::InvalidDocument { .. })
        ));
    }

    #[tokio::test]
    async fn subscription_pushes_full_snapshots_until_unsubscribed() {
        let (_remote, store) = client();
        store.seed_if_empty(false).await.unwrap();
        let pushes = Arc::new(Mutex::new(Vec::<usize>::new()));
        let sink = Arc::clone(&pushes);
        let mut subscription = store
            .subscribe(move |tasks| sink.lock().push(tasks.len()), |_| {})
            .await
            .unwrap();

        store.delete_task("task_020").await.unwrap();
        assert_eq!(*pushes.lock(), vec![20, 19]);

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        store.delete_task("task_019").await.unwrap();
        assert_eq!(pushes.lock().len(), 2);
    }
}
