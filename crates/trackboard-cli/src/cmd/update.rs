//! `tb update`: edit task fields.

use std::path::Path;

use clap::Args;
use trackboard_core::model::{Category, Priority, TaskPatch};

use crate::app::App;
use crate::cmd::mutation_result;
use crate::output::{CliError, OutputMode, render_error};

#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Task id, e.g. task_007.
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub module: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub priority: Option<Priority>,

    #[arg(long)]
    pub category: Option<Category>,

    #[arg(long, conflicts_with = "clear_assignee")]
    pub assignee: Option<String>,

    /// Remove the current assignee.
    #[arg(long)]
    pub clear_assignee: bool,

    #[arg(long)]
    pub estimated_hours: Option<f64>,

    #[arg(long, conflicts_with = "clear_findings")]
    pub findings: Option<String>,

    /// Remove recorded findings.
    #[arg(long)]
    pub clear_findings: bool,

    /// Replace tags; repeat for several.
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

impl UpdateArgs {
    fn to_patch(&self) -> TaskPatch {
        let nullable = |value: &Option<String>, clear: bool| {
            if clear {
                Some(None)
            } else {
                value.clone().map(Some)
            }
        };
        TaskPatch {
            title: self.title.clone(),
            module: self.module.clone(),
            description: self.description.clone(),
            priority: self.priority,
            category: self.category,
            assignee: nullable(&self.assignee, self.clear_assignee),
            estimated_hours: self.estimated_hours,
            findings: nullable(&self.findings, self.clear_findings),
            tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
            ..TaskPatch::default()
        }
    }
}

pub async fn run_update(
    args: &UpdateArgs,
    password: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let patch = args.to_patch();
    if patch.is_empty() {
        render_error(output, &CliError::new("no fields to update"))?;
        anyhow::bail!("empty update");
    }
    if let Err(invalid) = patch.validate() {
        render_error(output, &CliError::new(invalid.to_string()))?;
        return Err(invalid.into());
    }

    let app = App::open(project_root, output)?;
    app.require_tester(password, output)?;

    let sync = app.sync();
    sync.activate().await;
    let result = sync.update_partial(&args.id, patch).await;
    let task = sync.state().task(&args.id).cloned();
    sync.deactivate();

    mutation_result(result, task.as_ref(), &format!("updated {}", args.id), output)
}
