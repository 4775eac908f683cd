//! `tb list`: list tasks with status and text filters.

use std::io::{self, Write};
use std::path::Path;

use clap::Args;
use trackboard_core::filter::{StatusFilter, filter_tasks};
use trackboard_core::model::Task;

use crate::app::App;
use crate::output::{CliError, OutputMode, Renderable, render_error, render_list};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by status: all, pending, in-progress, completed, blocked.
    #[arg(short, long, default_value = "all")]
    pub status: StatusFilter,

    /// Case-insensitive text matched against title, module and tags.
    #[arg(short = 'q', long)]
    pub search: Option<String>,

    /// Maximum tasks to show.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// One task as a list row.
pub struct TaskRow<'a>(pub &'a Task);

impl Renderable for TaskRow<'_> {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let task = self.0;
        writeln!(
            w,
            "{:>2}  {:<12} {:<8} {}  [{}]",
            task.day,
            task.status.as_str(),
            task.priority.as_str(),
            task.title,
            task.module
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, &task_json(self.0)).map_err(io::Error::other)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let task = self.0;
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}",
            task.id, task.day, task.status, task.priority, task.module, task.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "DAY", "STATUS", "PRIORITY", "MODULE", "TITLE"]
    }
}

/// Wire-shaped JSON for a task, with its id.
pub fn task_json(task: &Task) -> serde_json::Value {
    let mut value = serde_json::to_value(task).unwrap_or(serde_json::Value::Null);
    if let Some(object) = value.as_object_mut() {
        object.insert("id".to_string(), serde_json::Value::String(task.id.clone()));
    }
    value
}

pub async fn run_list(args: &ListArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let app = App::open(project_root, output)?;
    let sync = app.sync();
    sync.activate().await;

    let state = sync.state();
    if let Some(error) = &state.error
        && state.tasks.is_empty()
    {
        render_error(output, &CliError::new(error.clone()))?;
        anyhow::bail!("could not load tasks");
    }

    let mut tasks = filter_tasks(&state.tasks, args.status, args.search.as_deref().unwrap_or(""));
    if let Some(limit) = args.limit {
        tasks.truncate(limit);
    }
    let rows: Vec<TaskRow<'_>> = tasks.iter().map(TaskRow).collect();
    render_list(&rows, output)?;
    sync.deactivate();
    Ok(())
}
