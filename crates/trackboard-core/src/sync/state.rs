use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::Task;

/// Lifecycle phase of a [`TaskSync`](super::TaskSync).
///
/// `Seeding` and `Loading` are transient. `Ready` is the steady state; the
/// error flag on [`SyncState`] is orthogonal to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Uninitialized,
    Seeding,
    Loading,
    Ready,
}

impl SyncPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Seeding => "seeding",
            Self::Loading => "loading",
            Self::Ready => "ready",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a view needs to render the task list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    pub phase: SyncPhase,
    /// Ordered by day.
    pub tasks: Vec<Task>,
    pub loading: bool,
    /// User-facing message; `None` when healthy.
    pub error: Option<String>,
    /// Wall-clock time of the last successful fetch or push.
    pub last_sync: Option<DateTime<Utc>>,
    /// In-flight mutation count per task id.
    pub updating: BTreeMap<String, usize>,
}

impl SyncState {
    /// Whether any mutation for `id` is in flight.
    #[must_use]
    pub fn is_updating(&self, id: &str) -> bool {
        self.updating.get(id).is_some_and(|count| *count > 0)
    }

    #[must_use]
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub(crate) fn begin_update(&mut self, id: &str) {
        *self.updating.entry(id.to_string()).or_default() += 1;
    }

    pub(crate) fn end_update(&mut self, id: &str) {
        if let Some(count) = self.updating.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.updating.remove(id);
            }
        }
    }
}
