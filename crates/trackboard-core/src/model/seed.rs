//! The fixed initial task set written on first launch.
//!
//! Twenty days of work across five phases. Ids are deterministic
//! (`task_001` … `task_020`) so reseeding an empty store reproduces the
//! same documents, and every record starts `pending`.

use chrono::{DateTime, Utc};

use super::task::{Category, Priority, Status, Task};

struct SeedRow {
    day: u32,
    title: &'static str,
    module: &'static str,
    priority: Priority,
    category: Category,
    estimated_hours: f64,
    description: &'static str,
    tags: &'static [&'static str],
}

const ROWS: [SeedRow; 20] = [
    // Phase 1: setup
    SeedRow {
        day: 1,
        title: "Provision staging environment",
        module: "Infrastructure",
        priority: Priority::High,
        category: Category::Infrastructure,
        estimated_hours: 6.0,
        description: "Stand up the staging stack and verify every service reports healthy.",
        tags: &["staging", "setup"],
    },
    SeedRow {
        day: 2,
        title: "Verify database migrations",
        module: "Database",
        priority: Priority::High,
        category: Category::Database,
        estimated_hours: 4.0,
        description: "Run all migrations forward and back on a copy of production data.",
        tags: &["migrations", "schema"],
    },
    SeedRow {
        day: 3,
        title: "Smoke-test CI pipeline",
        module: "Build",
        priority: Priority::Medium,
        category: Category::Testing,
        estimated_hours: 3.0,
        description: "Confirm the pipeline builds, tests and publishes artifacts from a clean checkout.",
        tags: &["ci", "smoke"],
    },
    SeedRow {
        day: 4,
        title: "Audit environment secrets",
        module: "Security",
        priority: Priority::Critical,
        category: Category::Security,
        estimated_hours: 3.0,
        description: "Check that no secret is committed and each environment reads from the vault.",
        tags: &["secrets", "audit"],
    },
    // Phase 2: core features
    SeedRow {
        day: 5,
        title: "Login and registration flows",
        module: "Auth",
        priority: Priority::Critical,
        category: Category::Authentication,
        estimated_hours: 8.0,
        description: "Exercise sign-up, sign-in, email verification and error states.",
        tags: &["login", "registration"],
    },
    SeedRow {
        day: 6,
        title: "Password reset",
        module: "Auth",
        priority: Priority::High,
        category: Category::Authentication,
        estimated_hours: 4.0,
        description: "Reset links expire, are single-use, and do not leak account existence.",
        tags: &["password", "email"],
    },
    SeedRow {
        day: 7,
        title: "Session expiry handling",
        module: "Auth",
        priority: Priority::High,
        category: Category::Authentication,
        estimated_hours: 5.0,
        description: "Expired sessions redirect to login and refresh tokens rotate correctly.",
        tags: &["session", "jwt"],
    },
    SeedRow {
        day: 8,
        title: "Project CRUD endpoints",
        module: "Projects API",
        priority: Priority::High,
        category: Category::Api,
        estimated_hours: 6.0,
        description: "Create, read, update and delete projects including validation errors.",
        tags: &["rest", "crud"],
    },
    // Phase 3: integration
    SeedRow {
        day: 9,
        title: "Pagination and sorting",
        module: "Projects API",
        priority: Priority::Medium,
        category: Category::Api,
        estimated_hours: 4.0,
        description: "Cursor pagination is stable under concurrent inserts; sort keys are honoured.",
        tags: &["pagination", "rest"],
    },
    SeedRow {
        day: 10,
        title: "Dashboard rendering",
        module: "Web App",
        priority: Priority::Medium,
        category: Category::Frontend,
        estimated_hours: 5.0,
        description: "Widgets render with empty, partial and full data sets across breakpoints.",
        tags: &["ui", "responsive"],
    },
    SeedRow {
        day: 11,
        title: "Form validation",
        module: "Web App",
        priority: Priority::Medium,
        category: Category::Frontend,
        estimated_hours: 4.0,
        description: "Client and server validation messages agree for every form field.",
        tags: &["ui", "forms"],
    },
    SeedRow {
        day: 12,
        title: "Third-party payment webhook",
        module: "Billing",
        priority: Priority::Critical,
        category: Category::Api,
        estimated_hours: 6.0,
        description: "Webhooks are verified, idempotent, and retried payloads do not double-charge.",
        tags: &["payments", "webhook"],
    },
    // Phase 4: hardening
    SeedRow {
        day: 13,
        title: "Role-based access control",
        module: "Auth",
        priority: Priority::Critical,
        category: Category::Security,
        estimated_hours: 6.0,
        description: "Each role sees exactly the resources it is granted, including via direct URLs.",
        tags: &["rbac", "permissions"],
    },
    SeedRow {
        day: 14,
        title: "Input sanitisation sweep",
        module: "Security",
        priority: Priority::High,
        category: Category::Security,
        estimated_hours: 5.0,
        description: "Probe every text input for injection and stored XSS.",
        tags: &["xss", "injection"],
    },
    SeedRow {
        day: 15,
        title: "Load test critical paths",
        module: "Performance",
        priority: Priority::High,
        category: Category::Performance,
        estimated_hours: 8.0,
        description: "Sustain target throughput on login, dashboard and checkout with p95 under budget.",
        tags: &["load", "latency"],
    },
    SeedRow {
        day: 16,
        title: "Query performance review",
        module: "Database",
        priority: Priority::Medium,
        category: Category::Performance,
        estimated_hours: 4.0,
        description: "Slow-query log is clean under load and every hot query uses an index.",
        tags: &["indexes", "queries"],
    },
    // Phase 5: release
    SeedRow {
        day: 17,
        title: "Backup and restore drill",
        module: "Infrastructure",
        priority: Priority::High,
        category: Category::Database,
        estimated_hours: 4.0,
        description: "Restore last night's backup into a scratch environment and verify integrity.",
        tags: &["backup", "disaster-recovery"],
    },
    SeedRow {
        day: 18,
        title: "Accessibility pass",
        module: "Web App",
        priority: Priority::Medium,
        category: Category::Frontend,
        estimated_hours: 5.0,
        description: "Keyboard navigation, focus order and screen reader labels on every page.",
        tags: &["a11y", "ui"],
    },
    SeedRow {
        day: 19,
        title: "Release notes and runbook",
        module: "Docs",
        priority: Priority::Low,
        category: Category::Documentation,
        estimated_hours: 3.0,
        description: "Document user-facing changes and the rollback procedure.",
        tags: &["docs", "release"],
    },
    SeedRow {
        day: 20,
        title: "Production go-live checklist",
        module: "Release",
        priority: Priority::Critical,
        category: Category::Testing,
        estimated_hours: 4.0,
        description: "Final regression run, monitoring alerts armed, sign-off collected.",
        tags: &["release", "regression"],
    },
];

/// Deterministic id for a seeded day.
#[must_use]
pub fn seed_id(day: u32) -> String {
    format!("task_{day:03}")
}

/// Build the fixed task set, every record stamped with `stamp`.
#[must_use]
pub fn initial_tasks(stamp: DateTime<Utc>) -> Vec<Task> {
    ROWS.iter()
        .map(|row| Task {
            id: seed_id(row.day),
            day: row.day,
            title: row.title.to_string(),
            module: row.module.to_string(),
            status: Status::Pending,
            priority: row.priority,
            category: row.category,
            description: row.description.to_string(),
            findings: None,
            assignee: None,
            estimated_hours: row.estimated_hours,
            actual_hours: None,
            last_updated: stamp,
            tags: row.tags.iter().map(ToString::to_string).collect(),
            created_at: stamp,
            order: row.day,
        })
        .collect()
}
