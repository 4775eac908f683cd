//! `tb seed`: write the initial task set.

use std::path::Path;

use clap::Args;
use serde::Serialize;
use trackboard_core::store::SeedOutcome;

use crate::app::App;
use crate::output::{CliError, OutputMode, render, render_error};

#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Overwrite the seeded tasks even if the store already has tasks.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct SeedReport {
    seeded: bool,
    written: usize,
    batches: usize,
}

impl From<SeedOutcome> for SeedReport {
    fn from(outcome: SeedOutcome) -> Self {
        match outcome {
            SeedOutcome::Skipped => Self {
                seeded: false,
                written: 0,
                batches: 0,
            },
            SeedOutcome::Seeded { written, batches } => Self {
                seeded: true,
                written,
                batches,
            },
        }
    }
}

pub async fn run_seed(
    args: &SeedArgs,
    password: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let app = App::open(project_root, output)?;
    app.require_tester(password, output)?;

    let outcome = match app.store.seed_if_empty(args.force).await {
        Ok(outcome) => outcome,
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            return Err(err.into());
        }
    };

    render(output, &SeedReport::from(outcome), |report, w| {
        if report.seeded {
            writeln!(w, "✓ wrote {} tasks in {} batch(es)", report.written, report.batches)
        } else {
            writeln!(w, "store already has tasks; nothing written (use --force to overwrite)")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_from_outcome() {
        let report = SeedReport::from(SeedOutcome::Seeded {
            written: 20,
            batches: 1,
        });
        assert!(report.seeded);
        assert_eq!(report.written, 20);

        let skipped = SeedReport::from(SeedOutcome::Skipped);
        assert!(!skipped.seeded);
        assert_eq!(skipped.batches, 0);
    }
}
