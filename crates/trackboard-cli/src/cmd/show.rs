//! `tb show`: full details of one task.

use std::io::{self, Write};
use std::path::Path;

use clap::Args;
use trackboard_core::error::ErrorCode;
use trackboard_core::model::Task;

use crate::app::App;
use crate::cmd::list::task_json;
use crate::output::{
    CliError, OutputMode, Renderable, pretty_kv, pretty_section, render_error, render_item,
};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Task id, e.g. task_007.
    pub id: String,
}

pub struct TaskDetail<'a>(pub &'a Task);

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

impl Renderable for TaskDetail<'_> {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let task = self.0;
        pretty_section(w, &format!("Day {}: {}", task.day, task.title))?;
        pretty_kv(w, "ID", &task.id)?;
        pretty_kv(w, "Module", &task.module)?;
        pretty_kv(w, "Status", task.status.as_str())?;
        pretty_kv(w, "Priority", task.priority.as_str())?;
        pretty_kv(w, "Category", task.category.as_str())?;
        pretty_kv(w, "Assignee", or_dash(task.assignee.as_deref()))?;
        pretty_kv(w, "Estimate", format!("{}h", task.estimated_hours))?;
        pretty_kv(
            w,
            "Actual",
            task.actual_hours.map_or_else(|| "-".to_string(), |h| format!("{h}h")),
        )?;
        pretty_kv(w, "Tags", task.tags.join(", "))?;
        pretty_kv(w, "Last updated", task.last_updated.to_rfc3339())?;
        pretty_kv(w, "Created", task.created_at.to_rfc3339())?;
        if !task.description.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", task.description)?;
        }
        if let Some(findings) = &task.findings {
            writeln!(w)?;
            writeln!(w, "Findings: {findings}")?;
        }
        Ok(())
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *w, &task_json(self.0)).map_err(io::Error::other)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let task = self.0;
        writeln!(w, "id\t{}", task.id)?;
        writeln!(w, "day\t{}", task.day)?;
        writeln!(w, "title\t{}", task.title)?;
        writeln!(w, "module\t{}", task.module)?;
        writeln!(w, "status\t{}", task.status)?;
        writeln!(w, "priority\t{}", task.priority)?;
        writeln!(w, "category\t{}", task.category)?;
        writeln!(w, "assignee\t{}", or_dash(task.assignee.as_deref()))?;
        writeln!(w, "findings\t{}", or_dash(task.findings.as_deref()))?;
        writeln!(w, "last_updated\t{}", task.last_updated.to_rfc3339())
    }
}

pub async fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let app = App::open(project_root, output)?;
    match app.store.get_task(&args.id).await {
        Ok(Some(task)) => {
            render_item(&TaskDetail(&task), output)?;
            Ok(())
        }
        Ok(None) => {
            render_error(
                output,
                &CliError::coded(format!("task '{}' not found", args.id), ErrorCode::TaskNotFound),
            )?;
            anyhow::bail!("task not found: {}", args.id)
        }
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use trackboard_core::model::seed::initial_tasks;

    #[test]
    fn human_detail_lists_core_fields() {
        let mut tasks = initial_tasks(Utc::now());
        tasks[6].findings = Some("token refresh races logout".into());
        let mut buf = Vec::new();
        TaskDetail(&tasks[6]).render_human(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Day 7: "));
        assert!(text.contains("task_007"));
        assert!(text.contains("pending"));
        assert!(text.contains("Findings: token refresh races logout"));
    }

    #[test]
    fn json_detail_parses() {
        let tasks = initial_tasks(Utc::now());
        let mut buf = Vec::new();
        TaskDetail(&tasks[0]).render_json(&mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["day"], 1);
    }
}
