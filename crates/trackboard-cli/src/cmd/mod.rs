pub mod delete;
pub mod gate;
pub mod list;
pub mod seed;
pub mod session;
pub mod show;
pub mod status;
pub mod update;

use trackboard_core::model::Task;
use trackboard_core::sync::SyncError;

use crate::cmd::list::task_json;
use crate::output::{CliError, OutputMode, render, render_error, render_success};

/// Report the outcome of a controller mutation.
///
/// JSON output carries the task as the controller now sees it.
pub(crate) fn mutation_result(
    result: Result<(), SyncError>,
    task: Option<&Task>,
    message: &str,
    output: OutputMode,
) -> anyhow::Result<()> {
    match result {
        Ok(()) if output.is_json() => {
            let value = serde_json::json!({
                "ok": true,
                "message": message,
                "task": task.map(task_json),
            });
            render(output, &value, |_, _| Ok(()))
        }
        Ok(()) => render_success(output, message),
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            Err(err.into())
        }
    }
}
