//! The hosted document store, seen from the client.
//!
//! [`DocumentStore`] is the whole surface the task layer consumes: ordered
//! list queries with an optional limit and cursor, point reads and writes,
//! atomic batches bounded by a ceiling, an existence probe, and a live
//! listener that delivers the full ordered result set on every change.
//!
//! Implementations own transport and persistence. [`memory`] provides an
//! in-process store used by tests and by the CLI.

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ErrorCode;

/// Stored fields of one document.
pub type Document = Map<String, Value>;

/// Fields of a write, keyed by field name.
pub type WriteFields = BTreeMap<String, FieldValue>;

/// Largest batch most hosted document stores accept in one commit.
pub const DEFAULT_MAX_BATCH: usize = 500;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a document store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// Network, timeout or backend outage.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the caller.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A batch exceeded the store's ceiling.
    #[error("batch of {len} writes exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// A document or write was rejected as malformed.
    #[error("invalid document {id}: {reason}")]
    InvalidDocument { id: String, reason: String },

    /// Local persistence of the store failed.
    #[error("store persistence failed: {0}")]
    Persistence(String),
}

impl StoreError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::TaskNotFound,
            Self::Unavailable(_) => ErrorCode::StoreUnavailable,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::BatchTooLarge { .. } => ErrorCode::BatchTooLarge,
            Self::InvalidDocument { .. } => ErrorCode::InvalidDocument,
            Self::Persistence(_) => ErrorCode::LocalStorageFailed,
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Persistence(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Values, queries, batches
// ---------------------------------------------------------------------------

/// A value in a write: either a literal or the store's "now".
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    /// Replaced by the store's own timestamp when the write is applied.
    ServerTimestamp,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Wrap every literal of a document as a write field.
#[must_use]
pub fn literal_fields(document: Document) -> WriteFields {
    document
        .into_iter()
        .map(|(key, value)| (key, FieldValue::Value(value)))
        .collect()
}

/// How a point write treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Create or overwrite the whole document.
    Replace,
    /// Create if absent, otherwise overwrite only the given fields.
    Merge,
}

/// An ordered list query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Ascending sort field. Documents missing it are excluded.
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    /// Cursor: only documents whose sort value is strictly greater.
    pub start_after: Option<Value>,
}

impl Query {
    #[must_use]
    pub fn ordered_by(field: impl Into<String>) -> Self {
        Self {
            order_by: Some(field.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn start_after(mut self, cursor: impl Into<Value>) -> Self {
        self.start_after = Some(cursor.into());
        self
    }
}

/// One entry of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Set {
        id: String,
        fields: WriteFields,
        mode: SetMode,
    },
    Delete {
        id: String,
    },
}

/// A document as returned by reads and listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub data: Document,
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Receiver of live query results.
///
/// `on_snapshot` gets the full ordered result on every change, never a
/// diff. `on_error` reports a listener-side failure; the listener stays
/// registered and later snapshots still arrive.
pub trait SnapshotListener: Send + Sync {
    fn on_snapshot(&self, documents: Vec<DocumentSnapshot>);
    fn on_error(&self, error: StoreError);
}

/// Handle returned by [`DocumentStore::listen`]. Dropping it removes the
/// listener.
pub struct ListenerRegistration {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Remove the listener. Returns `false` if it was already removed.
    pub fn remove(&mut self) -> bool {
        self.remove.take().is_some_and(|remove| {
            remove();
            true
        })
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.remove.is_some()
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Abstraction over the hosted document database.
pub trait DocumentStore: Send + Sync + 'static {
    /// Run an ordered list query.
    fn list(
        &self,
        collection: &str,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<DocumentSnapshot>, StoreError>> + Send;

    /// Point read; `Ok(None)` when absent.
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<DocumentSnapshot>, StoreError>> + Send;

    /// Point write in either [`SetMode`].
    fn set(
        &self,
        collection: &str,
        id: &str,
        fields: WriteFields,
        mode: SetMode,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Overwrite fields of an existing document; [`StoreError::NotFound`]
    /// when absent.
    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: WriteFields,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Create a document under a store-assigned id.
    fn add(
        &self,
        collection: &str,
        fields: WriteFields,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Delete a document. Deleting an absent document succeeds.
    fn delete(&self, collection: &str, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Apply all ops atomically, or none. Fails with
    /// [`StoreError::BatchTooLarge`] above [`max_batch_size`](Self::max_batch_size).
    fn commit(
        &self,
        collection: &str,
        ops: Vec<BatchOp>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Register a live listener on a query.
    fn listen(
        &self,
        collection: &str,
        query: Query,
        listener: Arc<dyn SnapshotListener>,
    ) -> impl Future<Output = Result<ListenerRegistration, StoreError>> + Send;

    /// Cheapest possible "is there at least one document" probe.
    fn exists(&self, collection: &str) -> impl Future<Output = Result<bool, StoreError>> + Send {
        async move {
            let probe = Query::default().limit(1);
            Ok(!self.list(collection, &probe).await?.is_empty())
        }
    }

    /// Batch ceiling for [`commit`](Self::commit).
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn registration_removes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registration = ListenerRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(registration.remove());
        assert!(!registration.remove());
        drop(registration);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_removes_listener() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        drop(ListenerRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn query_builder_sets_fields() {
        let query = Query::ordered_by("day").limit(5).start_after(3);
        assert_eq!(query.order_by.as_deref(), Some("day"));
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.start_after, Some(Value::from(3)));
    }

    #[test]
    fn transient_classification() {
        assert!(StoreError::Unavailable("offline".into()).is_transient());
        assert!(
            !StoreError::NotFound {
                collection: "tasks".into(),
                id: "x".into()
            }
            .is_transient()
        );
        assert_eq!(
            StoreError::BatchTooLarge { len: 3, max: 2 }.code(),
            ErrorCode::BatchTooLarge
        );
    }
}
