//! In-process [`DocumentStore`].
//!
//! Behaves like the hosted store from the client's point of view: ordered
//! queries, server timestamps, an atomic batch ceiling, and listeners that
//! receive the full ordered result after every committed change. It can
//! optionally mirror its contents to a JSON file so that separate CLI
//! invocations see the same data.
//!
//! # Test controls
//!
//! - [`fail_next_reads`](MemoryDocumentStore::fail_next_reads) /
//!   [`fail_next_writes`](MemoryDocumentStore::fail_next_writes) inject
//!   transient failures for a number of calls.
//! - [`set_offline`](MemoryDocumentStore::set_offline) fails everything
//!   until cleared.
//! - [`PushDelivery::Deferred`] queues listener pushes until
//!   [`deliver_pending`](MemoryDocumentStore::deliver_pending), which lets
//!   tests observe state "before the next push" and replay stale pushes.
//! - [`emit_listener_error`](MemoryDocumentStore::emit_listener_error)
//!   reports an error to every listener without removing it.
//!
//! # Invariants
//!
//! - Server timestamps are strictly increasing:
//!   `stamp_us = max(system_time_us, last + 1)`.
//! - A failed or rejected write leaves the data and listeners untouched.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;

use super::{
    BatchOp, DEFAULT_MAX_BATCH, Document, DocumentSnapshot, DocumentStore, FieldValue,
    ListenerRegistration, Query, SetMode, SnapshotListener, StoreError, WriteFields,
};
use crate::timestamp::StoreTimestamp;

const GENERATED_ID_LEN: usize = 20;

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// When listener pushes are handed to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushDelivery {
    /// Right after the change is applied.
    #[default]
    Immediate,
    /// Queued until [`MemoryDocumentStore::deliver_pending`].
    Deferred,
}

struct Registered {
    collection: String,
    query: Query,
    listener: Arc<dyn SnapshotListener>,
}

enum Push {
    Snapshot(Arc<dyn SnapshotListener>, Vec<DocumentSnapshot>),
    Error(Arc<dyn SnapshotListener>, StoreError),
}

impl Push {
    fn deliver(self) {
        match self {
            Self::Snapshot(listener, documents) => listener.on_snapshot(documents),
            Self::Error(listener, error) => listener.on_error(error),
        }
    }
}

#[derive(Default)]
struct Faults {
    failing_reads: u32,
    failing_writes: u32,
    offline: bool,
}

#[derive(Default)]
struct Counters {
    reads: u64,
    writes: u64,
}

struct Inner {
    collections: Collections,
    listeners: BTreeMap<u64, Registered>,
    next_listener: u64,
    last_stamp_us: i64,
    max_batch: usize,
    delivery: PushDelivery,
    pending: Vec<Push>,
    faults: Faults,
    counters: Counters,
    persist_path: Option<PathBuf>,
}

/// In-memory document store with optional JSON-file persistence.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// An empty store with the default batch ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::from_collections(Collections::new(), None)
    }

    /// Open a store mirrored to `path`, loading it if the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the file exists but cannot be
    /// read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let collections = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| StoreError::Persistence(format!("read {}: {e}", path.display())))?;
            serde_json::from_str::<Collections>(&content)
                .map_err(|e| StoreError::Persistence(format!("parse {}: {e}", path.display())))?
        } else {
            Collections::new()
        };
        tracing::debug!(path = %path.display(), "opened file-backed document store");
        Ok(Self::from_collections(collections, Some(path)))
    }

    fn from_collections(collections: Collections, persist_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                collections,
                listeners: BTreeMap::new(),
                next_listener: 0,
                last_stamp_us: 0,
                max_batch: DEFAULT_MAX_BATCH,
                delivery: PushDelivery::Immediate,
                pending: Vec::new(),
                faults: Faults::default(),
                counters: Counters::default(),
                persist_path,
            })),
        }
    }

    /// Override the batch ceiling.
    #[must_use]
    pub fn with_max_batch(self, max_batch: usize) -> Self {
        self.inner.lock().max_batch = max_batch.max(1);
        self
    }

    /// Switch push delivery mode. Switching to immediate flushes the queue.
    pub fn set_delivery(&self, delivery: PushDelivery) {
        self.inner.lock().delivery = delivery;
        if delivery == PushDelivery::Immediate {
            self.deliver_pending();
        }
    }

    /// Deliver queued pushes in order. Returns how many were delivered.
    pub fn deliver_pending(&self) -> usize {
        let pending = std::mem::take(&mut self.inner.lock().pending);
        let count = pending.len();
        for push in pending {
            push.deliver();
        }
        count
    }

    /// Number of queued pushes.
    #[must_use]
    pub fn pending_pushes(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Fail the next `count` read calls with [`StoreError::Unavailable`].
    pub fn fail_next_reads(&self, count: u32) {
        self.inner.lock().faults.failing_reads = count;
    }

    /// Fail the next `count` write calls with [`StoreError::Unavailable`].
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.lock().faults.failing_writes = count;
    }

    /// Fail every call until set back to `false`.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().faults.offline = offline;
    }

    /// Report `error` to every registered listener. Listeners stay active.
    pub fn emit_listener_error(&self, error: &StoreError) {
        let pushes: Vec<Push> = {
            let inner = self.inner.lock();
            inner
                .listeners
                .values()
                .map(|registered| Push::Error(Arc::clone(&registered.listener), error.clone()))
                .collect()
        };
        self.dispatch(pushes);
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Read calls served so far (list, get, exists).
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.inner.lock().counters.reads
    }

    /// Write calls accepted so far (set, update, add, delete, commit).
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.inner.lock().counters.writes
    }

    /// Raw stored fields of one document, bypassing faults and counters.
    #[must_use]
    pub fn raw_document(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner
            .lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Insert raw fields directly, bypassing stamping and listeners.
    pub fn insert_raw(&self, collection: &str, id: &str, data: Document) {
        self.inner
            .lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn check_read(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.faults.check(FaultKind::Read)?;
        inner.counters.reads += 1;
        Ok(())
    }

    /// Run one write under the lock: fault check, mutation, persistence,
    /// then listener pushes outside the lock.
    fn write<T>(
        &self,
        collection: &str,
        apply: impl FnOnce(&mut BTreeMap<String, Document>, StoreTimestamp) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let (pushes, value) = {
            let mut inner = self.inner.lock();
            inner.faults.check(FaultKind::Write)?;

            let stamp = inner.next_stamp();
            let mut staged = inner.collections.get(collection).cloned().unwrap_or_default();
            let value = apply(&mut staged, stamp)?;
            let previous = inner.collections.insert(collection.to_string(), staged);

            if let Err(err) = inner.persist() {
                match previous {
                    Some(docs) => inner.collections.insert(collection.to_string(), docs),
                    None => inner.collections.remove(collection),
                };
                return Err(err);
            }
            inner.counters.writes += 1;
            (inner.snapshots_for(collection), value)
        };
        self.dispatch(pushes);
        Ok(value)
    }

    fn dispatch(&self, pushes: Vec<Push>) {
        let deferred = {
            let mut inner = self.inner.lock();
            if inner.delivery == PushDelivery::Deferred {
                inner.pending.extend(pushes);
                return;
            }
            pushes
        };
        for push in deferred {
            push.deliver();
        }
    }
}

#[derive(Clone, Copy)]
enum FaultKind {
    Read,
    Write,
}

impl Faults {
    fn check(&mut self, kind: FaultKind) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        let counter = match kind {
            FaultKind::Read => &mut self.failing_reads,
            FaultKind::Write => &mut self.failing_writes,
        };
        if *counter > 0 {
            *counter -= 1;
            return Err(StoreError::Unavailable("injected transient failure".to_string()));
        }
        Ok(())
    }
}

impl Inner {
    fn next_stamp(&mut self) -> StoreTimestamp {
        let now_us = Utc::now().timestamp_micros();
        self.last_stamp_us = now_us.max(self.last_stamp_us + 1);
        StoreTimestamp::from_micros(self.last_stamp_us)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        write_atomically(path, &self.collections)
    }

    fn snapshots_for(&self, collection: &str) -> Vec<Push> {
        let docs = self.collections.get(collection);
        self.listeners
            .values()
            .filter(|registered| registered.collection == collection)
            .map(|registered| {
                let result = docs.map(|docs| run_query(docs, &registered.query)).unwrap_or_default();
                Push::Snapshot(Arc::clone(&registered.listener), result)
            })
            .collect()
    }
}

fn write_atomically(path: &Path, collections: &Collections) -> Result<(), StoreError> {
    let encoded = serde_json::to_string_pretty(collections)
        .map_err(|e| StoreError::Persistence(format!("encode store: {e}")))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StoreError::Persistence(format!("create {}: {e}", parent.display())))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, encoded)
        .map_err(|e| StoreError::Persistence(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| StoreError::Persistence(format!("rename to {}: {e}", path.display())))
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect()
}

fn resolve(fields: WriteFields, stamp: StoreTimestamp) -> Document {
    fields
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                FieldValue::Value(value) => value,
                FieldValue::ServerTimestamp => stamp.to_value(),
            };
            (key, value)
        })
        .collect()
}

fn apply_set(
    docs: &mut BTreeMap<String, Document>,
    id: &str,
    fields: WriteFields,
    mode: SetMode,
    stamp: StoreTimestamp,
) {
    let resolved = resolve(fields, stamp);
    match mode {
        SetMode::Replace => {
            docs.insert(id.to_string(), resolved);
        }
        SetMode::Merge => {
            docs.entry(id.to_string()).or_default().extend(resolved);
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn run_query(docs: &BTreeMap<String, Document>, query: &Query) -> Vec<DocumentSnapshot> {
    let mut rows: Vec<(&String, &Document)> = match &query.order_by {
        Some(field) => {
            let mut rows: Vec<_> = docs.iter().filter(|(_, data)| data.contains_key(field)).collect();
            rows.sort_by(|(a_id, a), (b_id, b)| {
                compare_values(&a[field], &b[field]).then_with(|| a_id.cmp(b_id))
            });
            if let Some(cursor) = &query.start_after {
                rows.retain(|(_, data)| compare_values(&data[field], cursor) == Ordering::Greater);
            }
            rows
        }
        None => docs.iter().collect(),
    };
    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }
    rows.into_iter()
        .map(|(id, data)| DocumentSnapshot {
            id: id.clone(),
            data: data.clone(),
        })
        .collect()
}

impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, collection: &str, query: &Query) -> Result<Vec<DocumentSnapshot>, StoreError> {
        self.check_read()?;
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .get(collection)
            .map(|docs| run_query(docs, query))
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>, StoreError> {
        self.check_read()?;
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| DocumentSnapshot {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: WriteFields,
        mode: SetMode,
    ) -> Result<(), StoreError> {
        self.write(collection, |docs, stamp| {
            apply_set(docs, id, fields, mode, stamp);
            Ok(())
        })
    }

    async fn update(&self, collection: &str, id: &str, fields: WriteFields) -> Result<(), StoreError> {
        self.write(collection, |docs, stamp| {
            let Some(existing) = docs.get_mut(id) else {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            };
            existing.extend(resolve(fields, stamp));
            Ok(())
        })
    }

    async fn add(&self, collection: &str, fields: WriteFields) -> Result<String, StoreError> {
        self.write(collection, |docs, stamp| {
            let mut id = generate_id();
            while docs.contains_key(&id) {
                id = generate_id();
            }
            docs.insert(id.clone(), resolve(fields, stamp));
            Ok(id)
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.write(collection, |docs, _| {
            docs.remove(id);
            Ok(())
        })
    }

    async fn commit(&self, collection: &str, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let max = self.max_batch_size();
        if ops.len() > max {
            return Err(StoreError::BatchTooLarge {
                len: ops.len(),
                max,
            });
        }
        self.write(collection, |docs, stamp| {
            for op in ops {
                match op {
                    BatchOp::Set { id, fields, mode } => apply_set(docs, &id, fields, mode, stamp),
                    BatchOp::Delete { id } => {
                        docs.remove(&id);
                    }
                }
            }
            Ok(())
        })
    }

    async fn listen(
        &self,
        collection: &str,
        query: Query,
        listener: Arc<dyn SnapshotListener>,
    ) -> Result<ListenerRegistration, StoreError> {
        let (key, initial) = {
            let mut inner = self.inner.lock();
            inner.faults.check(FaultKind::Read)?;
            let key = inner.next_listener;
            inner.next_listener += 1;
            let initial = inner
                .collections
                .get(collection)
                .map(|docs| run_query(docs, &query))
                .unwrap_or_default();
            inner.listeners.insert(
                key,
                Registered {
                    collection: collection.to_string(),
                    query,
                    listener: Arc::clone(&listener),
                },
            );
            (key, initial)
        };
        tracing::debug!(collection, listener = key, "listener registered");
        self.dispatch(vec![Push::Snapshot(listener, initial)]);

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().listeners.remove(&key);
                tracing::debug!(listener = key, "listener removed");
            }
        }))
    }

    fn max_batch_size(&self) -> usize {
        self.inner.lock().max_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        snapshots: Mutex<Vec<Vec<String>>>,
        errors: AtomicUsize,
    }

    impl SnapshotListener for Recorder {
        fn on_snapshot(&self, documents: Vec<DocumentSnapshot>) {
            self.snapshots
                .lock()
                .push(documents.into_iter().map(|d| d.id).collect());
        }

        fn on_error(&self, _error: StoreError) {
            self.errors.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    fn fields(value: Value) -> WriteFields {
        super::super::literal_fields(value.as_object().cloned().unwrap())
    }

    async fn seeded() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        for (id, day) in [("c", 3), ("a", 1), ("b", 2)] {
            store
                .set("tasks", id, fields(json!({ "day": day })), SetMode::Replace)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn list_orders_limits_and_pages() {
        let store = seeded().await;
        let ordered = Query::ordered_by("day");
        let ids: Vec<String> = store
            .list("tasks", &ordered)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);

        let page = store
            .list("tasks", &ordered.clone().start_after(1).limit(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "b");
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = seeded().await;
        let err = store
            .update("tasks", "zzz", fields(json!({ "day": 9 })))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.raw_document("tasks", "zzz").is_none());
    }

    #[tokio::test]
    async fn merge_keeps_untouched_fields() {
        let store = seeded().await;
        store
            .set("tasks", "a", fields(json!({ "title": "x" })), SetMode::Merge)
            .await
            .unwrap();
        let doc = store.raw_document("tasks", "a").unwrap();
        assert_eq!(doc["day"], json!(1));
        assert_eq!(doc["title"], json!("x"));
    }

    #[tokio::test]
    async fn server_timestamps_strictly_increase() {
        let store = MemoryDocumentStore::new();
        let mut last = None;
        for _ in 0..5 {
            let mut write = WriteFields::new();
            write.insert("at".into(), FieldValue::ServerTimestamp);
            store.set("t", "x", write, SetMode::Replace).await.unwrap();
            let stamp = StoreTimestamp::from_value(&store.raw_document("t", "x").unwrap()["at"]).unwrap();
            if let Some(previous) = last {
                assert!(stamp > previous);
            }
            last = Some(stamp);
        }
    }

    #[tokio::test]
    async fn commit_rejects_oversized_batches_atomically() {
        let store = MemoryDocumentStore::new().with_max_batch(2);
        let ops: Vec<BatchOp> = (0..3)
            .map(|i| BatchOp::Set {
                id: format!("d{i}"),
                fields: fields(json!({ "day": i })),
                mode: SetMode::Replace,
            })
            .collect();
        let err = store.commit("tasks", ops).await.unwrap_err();
        assert_eq!(err, StoreError::BatchTooLarge { len: 3, max: 2 });
        assert!(!store.exists("tasks").await.unwrap());
    }

    #[tokio::test]
    async fn listeners_get_initial_and_full_snapshots() {
        let store = seeded().await;
        let recorder = Arc::new(Recorder::default());
        let mut registration = store
            .listen("tasks", Query::ordered_by("day"), recorder.clone())
            .await
            .unwrap();
        store.delete("tasks", "b").await.unwrap();

        let snapshots = recorder.snapshots.lock().clone();
        assert_eq!(snapshots, vec![vec!["a", "b", "c"], vec!["a", "c"]]);

        assert!(registration.remove());
        assert_eq!(store.listener_count(), 0);
        store.delete("tasks", "a").await.unwrap();
        assert_eq!(recorder.snapshots.lock().len(), 2);
    }

    #[tokio::test]
    async fn deferred_delivery_queues_pushes() {
        let store = seeded().await;
        store.set_delivery(PushDelivery::Deferred);
        let recorder = Arc::new(Recorder::default());
        let _registration = store
            .listen("tasks", Query::ordered_by("day"), recorder.clone())
            .await
            .unwrap();
        store.delete("tasks", "c").await.unwrap();
        assert!(recorder.snapshots.lock().is_empty());
        assert_eq!(store.deliver_pending(), 2);
        assert_eq!(recorder.snapshots.lock().len(), 2);
    }

    #[tokio::test]
    async fn listener_errors_do_not_unregister() {
        let store = seeded().await;
        let recorder = Arc::new(Recorder::default());
        let _registration = store
            .listen("tasks", Query::ordered_by("day"), recorder.clone())
            .await
            .unwrap();
        store.emit_listener_error(&StoreError::Unavailable("blip".into()));
        store.delete("tasks", "a").await.unwrap();
        assert_eq!(recorder.errors.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(recorder.snapshots.lock().len(), 2);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let store = seeded().await;
        store.fail_next_reads(1);
        assert!(store.list("tasks", &Query::default()).await.is_err());
        assert!(store.list("tasks", &Query::default()).await.is_ok());

        store.fail_next_writes(1);
        assert!(store.delete("tasks", "a").await.is_err());
        assert!(store.raw_document("tasks", "a").is_some());

        store.set_offline(true);
        assert!(store.get("tasks", "a").await.is_err());
        store.set_offline(false);
        assert!(store.get("tasks", "a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn add_assigns_unique_ids() {
        let store = MemoryDocumentStore::new();
        let a = store.add("tasks", fields(json!({ "day": 1 }))).await.unwrap();
        let b = store.add("tasks", fields(json!({ "day": 2 }))).await.unwrap();
        assert_eq!(a.len(), GENERATED_ID_LEN);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn file_backed_store_reloads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        {
            let store = MemoryDocumentStore::open(&path).unwrap();
            store
                .set("tasks", "a", fields(json!({ "day": 1 })), SetMode::Replace)
                .await
                .unwrap();
        }
        let reopened = MemoryDocumentStore::open(&path).unwrap();
        assert_eq!(reopened.raw_document("tasks", "a").unwrap()["day"], json!(1));
    }
}
