//! `tb login` and `tb gate`: check the tester password and inspect the
//! lockout state.

use std::io::{self, Write};
use std::path::Path;

use clap::Args;
use serde::Serialize;

use crate::app::{App, Gate};
use crate::output::{CliError, OutputMode, pretty_kv, render, render_error, render_success};

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Password to check; falls back to the global --password or
    /// TRACKBOARD_PASSWORD.
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GateReport {
    pub authenticated: bool,
    pub locked: bool,
    pub attempts_used: u32,
    pub remaining_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_remaining_secs: Option<u64>,
}

impl GateReport {
    pub fn of(gate: &Gate) -> Self {
        Self {
            authenticated: gate.is_authenticated(),
            locked: gate.is_locked(),
            attempts_used: gate.attempts_used(),
            remaining_attempts: gate.remaining_attempts(),
            lockout_remaining_secs: gate.lockout_remaining().map(|d| d.as_secs().max(1)),
        }
    }

    pub fn write_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_kv(w, "Authenticated", yes_no(self.authenticated))?;
        pretty_kv(w, "Locked", yes_no(self.locked))?;
        pretty_kv(w, "Attempts used", self.attempts_used.to_string())?;
        pretty_kv(w, "Remaining", self.remaining_attempts.to_string())?;
        if let Some(secs) = self.lockout_remaining_secs {
            pretty_kv(w, "Unlocks in", format!("{secs}s"))?;
        }
        Ok(())
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn run_login(
    args: &LoginArgs,
    password: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let app = App::open(project_root, output)?;
    let Some(candidate) = args.password.as_deref().or(password) else {
        app.require_tester(None, output)?;
        return render_success(output, "password accepted");
    };
    app.login(candidate, output)?;
    render_success(output, "password accepted")
}

pub fn run_gate(output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let app = App::open(project_root, output)?;
    let report = GateReport::of(&app.gate);
    if report.locked && !output.is_json() {
        render_error(
            output,
            &CliError::new("the tester gate is locked after repeated failures"),
        )?;
    }
    render(output, &report, |report, w| report.write_human(w))
}
