//! Status + free-text projection of the task list.
//!
//! [`filter_tasks`] is the pure projection. [`TaskFilter`] holds the view's
//! inputs: the status selection applies at once, the search text only after
//! it has been quiet for the debounce window.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;

use crate::model::task::ParseEnumError;
use crate::model::{Status, Task};

/// Default quiescence window for search input.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Status selection of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

impl StatusFilter {
    #[must_use]
    pub fn matches(self, status: Status) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(status) => status.fmt(f),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Only)
    }
}

/// Keep tasks matching both `status` and `query`, in input order.
///
/// The query is trimmed and lowercased; an empty query matches everything.
/// A task matches when the query is a substring of its lowercased title,
/// module, or any one tag.
#[must_use]
pub fn filter_tasks(tasks: &[Task], status: StatusFilter, query: &str) -> Vec<Task> {
    let needle = query.trim().to_lowercase();
    tasks
        .iter()
        .filter(|task| status.matches(task.status) && matches_query(task, &needle))
        .cloned()
        .collect()
}

fn matches_query(task: &Task, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    task.title.to_lowercase().contains(needle)
        || task.module.to_lowercase().contains(needle)
        || task
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}

/// Text input that only takes effect after a quiet period.
#[derive(Debug, Clone)]
pub struct DebouncedQuery {
    delay: Duration,
    raw: String,
    applied: String,
    changed_at: Option<Instant>,
}

impl DebouncedQuery {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            raw: String::new(),
            applied: String::new(),
            changed_at: None,
        }
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Record new input and restart the quiet period.
    pub fn set(&mut self, input: impl Into<String>) {
        self.raw = input.into();
        self.changed_at = Some(Instant::now());
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn applied(&self) -> &str {
        &self.applied
    }

    /// Whether input is waiting out its quiet period.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.changed_at.is_some()
    }

    /// Promote the raw input if the quiet period has elapsed. Returns
    /// whether the applied query changed.
    pub fn poll(&mut self) -> bool {
        match self.changed_at {
            Some(at) if at.elapsed() >= self.delay => self.promote(),
            _ => false,
        }
    }

    /// Wait until the current input has been quiet for the full window,
    /// then promote it.
    pub async fn settle(&mut self) -> bool {
        if let Some(at) = self.changed_at {
            tokio::time::sleep_until(at + self.delay).await;
        }
        self.promote()
    }

    /// Drop both raw and applied text immediately.
    pub fn clear(&mut self) {
        self.raw.clear();
        self.applied.clear();
        self.changed_at = None;
    }

    fn promote(&mut self) -> bool {
        self.changed_at = None;
        if self.applied == self.raw {
            return false;
        }
        self.applied.clone_from(&self.raw);
        true
    }
}

impl Default for DebouncedQuery {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

/// A view's filter inputs.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    status: StatusFilter,
    query: DebouncedQuery,
}

impl TaskFilter {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            status: StatusFilter::All,
            query: DebouncedQuery::new(debounce),
        }
    }

    pub fn set_status(&mut self, status: StatusFilter) {
        self.status = status;
    }

    pub fn set_query(&mut self, input: impl Into<String>) {
        self.query.set(input);
    }

    #[must_use]
    pub const fn status(&self) -> StatusFilter {
        self.status
    }

    /// The search text as typed.
    #[must_use]
    pub fn query(&self) -> &str {
        self.query.raw()
    }

    /// The search text currently used for projection.
    #[must_use]
    pub fn applied_query(&self) -> &str {
        self.query.applied()
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.query.is_pending()
    }

    pub fn poll(&mut self) -> bool {
        self.query.poll()
    }

    pub async fn settle(&mut self) -> bool {
        self.query.settle().await
    }

    /// Reset status to all and the search to empty, without debounce.
    pub fn clear(&mut self) {
        self.status = StatusFilter::All;
        self.query.clear();
    }

    #[must_use]
    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        filter_tasks(tasks, self.status, self.query.applied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::seed::initial_tasks;
    use chrono::Utc;

    fn tasks() -> Vec<Task> {
        let mut tasks = initial_tasks(Utc::now());
        tasks[0].status = Status::Completed;
        tasks[1].status = Status::InProgress;
        tasks[2].tags = vec!["Hot-Path".into()];
        tasks
    }

    #[test]
    fn status_filter_parses() {
        assert_eq!("all".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!(
            "in-progress".parse::<StatusFilter>().unwrap(),
            StatusFilter::Only(Status::InProgress)
        );
        assert!("done".parse::<StatusFilter>().is_err());
        assert_eq!(StatusFilter::Only(Status::Blocked).to_string(), "blocked");
    }

    #[test]
    fn empty_query_and_all_is_identity() {
        let tasks = tasks();
        assert_eq!(filter_tasks(&tasks, StatusFilter::All, "   "), tasks);
    }

    #[test]
    fn status_only_keeps_order() {
        let tasks = tasks();
        let pending = filter_tasks(&tasks, StatusFilter::Only(Status::Pending), "");
        assert_eq!(pending.len(), 18);
        assert!(pending.windows(2).all(|w| w[0].day < w[1].day));
    }

    #[test]
    fn query_matches_tags_case_insensitively() {
        let tasks = tasks();
        let hits = filter_tasks(&tasks, StatusFilter::All, "  hot-PATH ");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, tasks[2].id);
    }

    #[test]
    fn query_matches_title_and_module() {
        let tasks = tasks();
        let title = tasks[4].title.to_uppercase();
        assert!(filter_tasks(&tasks, StatusFilter::All, &title).iter().any(|t| t.id == tasks[4].id));
        let module = tasks[5].module.clone();
        assert!(filter_tasks(&tasks, StatusFilter::All, &module).iter().any(|t| t.id == tasks[5].id));
    }

    #[test]
    fn blocked_with_no_matches_is_empty() {
        assert!(filter_tasks(&tasks(), StatusFilter::Only(Status::Blocked), "").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn query_applies_only_after_quiet_period() {
        let tasks = tasks();
        let mut filter = TaskFilter::default();
        filter.set_query("hot");
        assert_eq!(filter.query(), "hot");
        assert_eq!(filter.applied_query(), "");
        assert_eq!(filter.apply(&tasks).len(), 20);

        tokio::time::advance(Duration::from_millis(200)).await;
        filter.set_query("hot-path");
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!filter.poll());
        assert_eq!(filter.applied_query(), "");

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(filter.poll());
        assert_eq!(filter.applied_query(), "hot-path");
        assert_eq!(filter.apply(&tasks).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_applies_immediately_and_clear_resets() {
        let tasks = tasks();
        let mut filter = TaskFilter::new(Duration::from_millis(50));
        filter.set_status(StatusFilter::Only(Status::Completed));
        assert_eq!(filter.apply(&tasks).len(), 1);

        filter.set_query("auth");
        assert!(filter.settle().await);
        filter.clear();
        assert_eq!(filter.status(), StatusFilter::All);
        assert_eq!(filter.applied_query(), "");
        assert!(!filter.is_pending());
        assert_eq!(filter.apply(&tasks).len(), 20);
    }
}
