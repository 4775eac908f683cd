use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

use crate::error::ErrorCode;
use crate::timestamp;

/// Lifecycle status of a task.
///
/// Transitions are unrestricted: any status may move to any other,
/// including `completed -> pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl Status {
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Blocked,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Domain tag for the area of the system a task exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Authentication,
    Database,
    Api,
    Frontend,
    Testing,
    Security,
    Performance,
    Infrastructure,
    Documentation,
}

impl Category {
    pub const ALL: [Self; 9] = [
        Self::Authentication,
        Self::Database,
        Self::Api,
        Self::Frontend,
        Self::Testing,
        Self::Security,
        Self::Performance,
        Self::Infrastructure,
        Self::Documentation,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Database => "database",
            Self::Api => "api",
            Self::Frontend => "frontend",
            Self::Testing => "testing",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Infrastructure => "infrastructure",
            Self::Documentation => "documentation",
        }
    }
}

/// A tracked unit of engineering work, as stored in the `tasks` collection.
///
/// The document id is not part of the stored fields; it is carried
/// alongside and attached by [`Task::from_document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(skip)]
    pub id: String,
    pub day: u32,
    pub title: String,
    pub module: String,
    pub status: Status,
    pub priority: Priority,
    pub category: Category,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub findings: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub actual_hours: Option<f64>,
    #[serde(default = "Utc::now", with = "timestamp::wire")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now", with = "timestamp::wire")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub order: u32,
}

impl Task {
    /// Decode a stored document.
    ///
    /// # Errors
    ///
    /// Returns the serde error when a required field is missing or an enum
    /// value is not recognised.
    pub fn from_document(id: &str, data: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut task: Self = serde_json::from_value(Value::Object(data.clone()))?;
        task.id = id.to_string();
        Ok(task)
    }

    /// Encode the stored fields (everything but the id).
    ///
    /// # Errors
    ///
    /// Fails only if a float field is not finite.
    pub fn to_document(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

/// Fields for creating a task outside of seeding. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub day: u32,
    pub title: String,
    pub module: String,
    pub priority: Priority,
    pub category: Category,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A partial update. `None` leaves a field untouched; for the nullable
/// fields, `Some(None)` clears the stored value. `day` is fixed at creation
/// and has no patch field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub module: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub description: Option<String>,
    pub findings: Option<Option<String>>,
    pub assignee: Option<Option<String>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<Option<f64>>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    /// A patch touching only the status.
    #[must_use]
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Status change with optional companion fields. Companion fields that
    /// are `None` are left untouched rather than cleared.
    #[must_use]
    pub fn status_with(status: Status, actual_hours: Option<f64>, findings: Option<String>) -> Self {
        Self {
            status: Some(status),
            actual_hours: actual_hours.map(Some),
            findings: findings.map(Some),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check value constraints before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidField`] for negative or non-finite hour values.
    pub fn validate(&self) -> Result<(), InvalidField> {
        let hours = [
            ("estimatedHours", self.estimated_hours),
            ("actualHours", self.actual_hours.flatten()),
        ];
        for (field, value) in hours {
            if let Some(value) = value
                && (!value.is_finite() || value < 0.0)
            {
                return Err(InvalidField {
                    field,
                    reason: "hours must be a non-negative number",
                });
            }
        }
        Ok(())
    }

    /// Apply to a local copy. `last_updated` is left for the store to stamp.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(module) = &self.module {
            task.module.clone_from(module);
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(category) = self.category {
            task.category = category;
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(findings) = &self.findings {
            task.findings.clone_from(findings);
        }
        if let Some(assignee) = &self.assignee {
            task.assignee.clone_from(assignee);
        }
        if let Some(hours) = self.estimated_hours {
            task.estimated_hours = hours;
        }
        if let Some(hours) = self.actual_hours {
            task.actual_hours = hours;
        }
        if let Some(tags) = &self.tags {
            task.tags.clone_from(tags);
        }
    }

    /// The wire fields this patch sets, keyed by stored field name.
    #[must_use]
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        let mut put = |key: &str, value: Value| {
            fields.insert(key.to_string(), value);
        };
        if let Some(title) = &self.title {
            put("title", Value::from(title.as_str()));
        }
        if let Some(module) = &self.module {
            put("module", Value::from(module.as_str()));
        }
        if let Some(status) = self.status {
            put("status", Value::from(status.as_str()));
        }
        if let Some(priority) = self.priority {
            put("priority", Value::from(priority.as_str()));
        }
        if let Some(category) = self.category {
            put("category", Value::from(category.as_str()));
        }
        if let Some(description) = &self.description {
            put("description", Value::from(description.as_str()));
        }
        if let Some(findings) = &self.findings {
            put("findings", findings.as_deref().map_or(Value::Null, Value::from));
        }
        if let Some(assignee) = &self.assignee {
            put("assignee", assignee.as_deref().map_or(Value::Null, Value::from));
        }
        if let Some(hours) = self.estimated_hours {
            put("estimatedHours", Value::from(hours));
        }
        if let Some(hours) = self.actual_hours {
            put("actualHours", hours.map_or(Value::Null, Value::from));
        }
        if let Some(tags) = &self.tags {
            put("tags", Value::from(tags.clone()));
        }
        fields
    }
}

/// A patch value that violates a field constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidField {
    pub field: &'static str,
    pub reason: &'static str,
}

impl fmt::Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.field, self.reason)
    }
}

impl std::error::Error for InvalidField {}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl ParseEnumError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidEnumValue
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase().replace('_', "-")
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "pending" => Ok(Self::Pending),
            "in-progress" | "inprogress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Category {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                expected: "category",
                got: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, Priority, Status, Task, TaskPatch};
    use crate::error::ErrorCode;
    use serde_json::json;
    use std::str::FromStr;

    fn sample() -> Task {
        let data = json!({
            "day": 7,
            "title": "Session expiry handling",
            "module": "Auth",
            "status": "pending",
            "priority": "high",
            "category": "authentication",
            "estimatedHours": 4.5,
            "tags": ["session", "jwt"],
            "lastUpdated": { "seconds": 1_700_000_000, "nanoseconds": 0 },
            "createdAt": { "seconds": 1_700_000_000, "nanoseconds": 0 },
            "order": 7
        });
        Task::from_document("task_007", data.as_object().unwrap()).unwrap()
    }

    #[test]
    fn enum_json_uses_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&Status::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"critical\"");
        assert_eq!(serde_json::to_string(&Category::Api).unwrap(), "\"api\"");
        assert_eq!(
            serde_json::from_str::<Status>("\"blocked\"").unwrap(),
            Status::Blocked
        );
    }

    #[test]
    fn display_parse_roundtrips() {
        for value in Status::ALL {
            assert_eq!(Status::from_str(&value.to_string()).unwrap(), value);
        }
        for value in Category::ALL {
            assert_eq!(Category::from_str(&value.to_string()).unwrap(), value);
        }
        for value in [Priority::Low, Priority::Medium, Priority::High, Priority::Critical] {
            assert_eq!(Priority::from_str(&value.to_string()).unwrap(), value);
        }
        assert_eq!(Status::from_str(" IN_PROGRESS ").unwrap(), Status::InProgress);
    }

    #[test]
    fn parse_rejects_unknown_values() {
        assert!(Status::from_str("done").is_err());
        assert!(Priority::from_str("urgent").is_err());
        assert!(Category::from_str("ml").is_err());
        let err = Status::from_str("done").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEnumValue);
        assert_eq!(err.to_string(), "invalid status: 'done'");
    }

    #[test]
    fn document_decode_attaches_id_and_defaults() {
        let task = sample();
        assert_eq!(task.id, "task_007");
        assert_eq!(task.day, 7);
        assert_eq!(task.status, Status::Pending);
        assert!(task.findings.is_none());
        assert!(task.actual_hours.is_none());
        assert_eq!(task.description, "");
        assert_eq!(task.last_updated.timestamp(), 1_700_000_000);
    }

    #[test]
    fn document_encode_omits_id() {
        let doc = sample().to_document().unwrap();
        assert!(!doc.contains_key("id"));
        assert_eq!(doc["lastUpdated"]["seconds"], json!(1_700_000_000));
        assert_eq!(doc["estimatedHours"], json!(4.5));
    }

    #[test]
    fn patch_applies_and_clears_nullable_fields() {
        let mut task = sample();
        task.assignee = Some("dana".to_string());
        let patch = TaskPatch {
            status: Some(Status::Completed),
            assignee: Some(None),
            actual_hours: Some(Some(6.0)),
            ..TaskPatch::default()
        };
        patch.apply_to(&mut task);
        assert_eq!(task.status, Status::Completed);
        assert!(task.assignee.is_none());
        assert_eq!(task.actual_hours, Some(6.0));
        assert_eq!(task.title, "Session expiry handling");
    }

    #[test]
    fn patch_fields_include_nulls_for_clears() {
        let patch = TaskPatch {
            findings: Some(None),
            status: Some(Status::Blocked),
            ..TaskPatch::default()
        };
        let fields = patch.to_fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["findings"], serde_json::Value::Null);
        assert_eq!(fields["status"], json!("blocked"));
    }

    #[test]
    fn full_patch_never_moves_the_day() {
        let mut task = sample();
        let patch = TaskPatch {
            title: Some("Renamed".into()),
            module: Some("auth".into()),
            status: Some(Status::InProgress),
            priority: Some(Priority::Critical),
            category: Some(Category::Security),
            description: Some("moved".into()),
            findings: Some(Some("note".into())),
            assignee: Some(Some("sam".into())),
            estimated_hours: Some(2.0),
            actual_hours: Some(Some(1.0)),
            tags: Some(vec!["x".into()]),
        };
        patch.apply_to(&mut task);
        assert_eq!(task.day, 7);
        let fields = patch.to_fields();
        assert_eq!(fields.len(), 11);
        assert!(!fields.contains_key("day"));
    }

    #[test]
    fn status_with_leaves_absent_companions_untouched() {
        let patch = TaskPatch::status_with(Status::Completed, None, Some("ok".into()));
        assert!(patch.actual_hours.is_none());
        assert_eq!(patch.findings, Some(Some("ok".to_string())));
    }

    #[test]
    fn validate_rejects_negative_hours() {
        let patch = TaskPatch {
            estimated_hours: Some(-1.0),
            ..TaskPatch::default()
        };
        assert_eq!(patch.validate().unwrap_err().field, "estimatedHours");
        assert!(TaskPatch::status(Status::Blocked).validate().is_ok());
        assert!(TaskPatch::default().is_empty());
    }
}
