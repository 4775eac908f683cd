//! `tb delete`: remove a task.

use std::path::Path;

use clap::Args;

use crate::app::App;
use crate::cmd::mutation_result;
use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Task id, e.g. task_007.
    pub id: String,
}

pub async fn run_delete(
    args: &DeleteArgs,
    password: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let app = App::open(project_root, output)?;
    app.require_tester(password, output)?;

    let sync = app.sync();
    sync.activate().await;
    let result = sync.delete_task(&args.id).await;
    sync.deactivate();

    mutation_result(result, None, &format!("deleted {}", args.id), output)
}
