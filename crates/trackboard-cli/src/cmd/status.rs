//! `tb status`: transition one task's status.

use std::path::Path;

use clap::Args;
use trackboard_core::model::Status;

use crate::app::App;
use crate::cmd::mutation_result;
use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Task id, e.g. task_007.
    pub id: String,

    /// New status: pending, in-progress, completed, blocked.
    pub status: Status,

    /// Hours actually spent.
    #[arg(long)]
    pub actual_hours: Option<f64>,

    /// Notes recorded with the transition.
    #[arg(long)]
    pub findings: Option<String>,
}

pub async fn run_status(
    args: &StatusArgs,
    password: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let app = App::open(project_root, output)?;
    app.require_tester(password, output)?;

    let sync = app.sync();
    sync.activate().await;
    let result = sync
        .update_status_with(&args.id, args.status, args.actual_hours, args.findings.clone())
        .await;
    let task = sync.state().task(&args.id).cloned();
    sync.deactivate();

    mutation_result(
        result,
        task.as_ref(),
        &format!("{} is now {}", args.id, args.status),
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: StatusArgs,
    }

    #[test]
    fn parses_status_and_companions() {
        let w = Wrapper::parse_from([
            "test",
            "task_007",
            "completed",
            "--actual-hours",
            "3.5",
            "--findings",
            "done early",
        ]);
        assert_eq!(w.args.id, "task_007");
        assert_eq!(w.args.status, Status::Completed);
        assert_eq!(w.args.actual_hours, Some(3.5));
        assert_eq!(w.args.findings.as_deref(), Some("done early"));
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(Wrapper::try_parse_from(["test", "task_007", "done"]).is_err());
    }
}
