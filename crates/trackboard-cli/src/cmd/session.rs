//! `tb session`: interactive dashboard session.
//!
//! Keeps one live controller open, prints a line whenever a push lands,
//! and reads commands from stdin until `quit` or end of input.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use trackboard_core::filter::{StatusFilter, TaskFilter};
use trackboard_core::model::Status;
use trackboard_core::remote::memory::MemoryDocumentStore;
use trackboard_core::sync::{SyncState, TaskSync};

use crate::app::App;
use crate::cmd::gate::GateReport;
use crate::cmd::list::TaskRow;
use crate::output::{CliError, OutputMode, render_error, render_list};

const HELP: &str = "\
commands:
  list                     show tasks through the current filter
  filter <status|all>      set the status filter
  search <text>            set the search text (applied after the debounce window)
  clear                    reset status filter and search
  status <id> <status>     change a task's status (requires login)
  sync                     reload from the store now
  login <password>         unlock tester actions
  logout                   lock tester actions
  gate                     show gate state
  help                     show this help
  quit                     leave the session";

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionCommand {
    List,
    Filter(StatusFilter),
    Search(String),
    Clear,
    SetStatus { id: String, status: Status },
    Sync,
    Login(String),
    Logout,
    Gate,
    Help,
    Quit,
    Empty,
}

fn parse_command(line: &str) -> Result<SessionCommand, CliError> {
    let line = line.trim();
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match head {
        "" => Ok(SessionCommand::Empty),
        "list" | "ls" => Ok(SessionCommand::List),
        "filter" => rest
            .parse()
            .map(SessionCommand::Filter)
            .map_err(|e| CliError::from(&e)),
        "search" => Ok(SessionCommand::Search(rest.to_string())),
        "clear" => Ok(SessionCommand::Clear),
        "status" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(status), None) => Ok(SessionCommand::SetStatus {
                    id: id.to_string(),
                    status: status.parse::<Status>().map_err(|e| CliError::from(&e))?,
                }),
                _ => Err(CliError::new("usage: status <id> <status>")),
            }
        }
        "sync" => Ok(SessionCommand::Sync),
        "login" if !rest.is_empty() => Ok(SessionCommand::Login(rest.to_string())),
        "login" => Err(CliError::new("usage: login <password>")),
        "logout" => Ok(SessionCommand::Logout),
        "gate" => Ok(SessionCommand::Gate),
        "help" | "?" => Ok(SessionCommand::Help),
        "quit" | "exit" | "q" => Ok(SessionCommand::Quit),
        other => Err(CliError::new(format!("unknown command '{other}' (try 'help')"))),
    }
}

/// What changed in a published state that is worth a line of output.
#[derive(Debug, Default, PartialEq)]
struct Seen {
    last_sync: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl Seen {
    fn of(state: &SyncState) -> Self {
        Self {
            last_sync: state.last_sync,
            error: state.error.clone(),
        }
    }
}

fn sync_notice(previous: &Seen, state: &SyncState) -> Option<String> {
    if state.error != previous.error
        && let Some(error) = &state.error
    {
        return Some(format!("[sync] {error}"));
    }
    (state.last_sync != previous.last_sync).then(|| format!("[sync] {} tasks", state.tasks.len()))
}

struct Session<'a> {
    app: &'a App,
    sync: TaskSync<MemoryDocumentStore>,
    filter: TaskFilter,
    output: OutputMode,
}

impl Session<'_> {
    /// Run one command. Returns `false` to end the session.
    async fn handle(&mut self, command: SessionCommand) -> anyhow::Result<bool> {
        match command {
            SessionCommand::Empty => {}
            SessionCommand::Help => println!("{HELP}"),
            SessionCommand::Quit => return Ok(false),
            SessionCommand::List => self.print_tasks()?,
            SessionCommand::Filter(status) => {
                self.filter.set_status(status);
                self.print_tasks()?;
            }
            SessionCommand::Search(text) => {
                self.filter.set_query(text);
                self.filter.settle().await;
                self.print_tasks()?;
            }
            SessionCommand::Clear => {
                self.filter.clear();
                self.print_tasks()?;
            }
            SessionCommand::SetStatus { id, status } => {
                if !self.app.gate.is_authenticated() {
                    println!("login required for status changes");
                    return Ok(true);
                }
                match self.sync.update_status(&id, status).await {
                    Ok(()) => println!("✓ {id} is now {status}"),
                    Err(err) => render_error(self.output, &CliError::from(&err))?,
                }
            }
            SessionCommand::Sync => match self.sync.refresh().await {
                Ok(source) => println!("✓ reloaded ({source:?})"),
                Err(err) => render_error(self.output, &CliError::from(&err))?,
            },
            SessionCommand::Login(password) => match self.app.gate.login(&password) {
                Ok(()) => println!("✓ tester actions unlocked"),
                Err(err) => render_error(self.output, &CliError::from(&err))?,
            },
            SessionCommand::Logout => {
                self.app.gate.logout()?;
                println!("✓ logged out");
            }
            SessionCommand::Gate => {
                let report = GateReport::of(&self.app.gate);
                let stdout = std::io::stdout();
                report.write_human(&mut stdout.lock())?;
            }
        }
        Ok(true)
    }

    fn print_tasks(&self) -> anyhow::Result<()> {
        let tasks = self.filter.apply(&self.sync.tasks());
        let rows: Vec<TaskRow<'_>> = tasks.iter().map(TaskRow).collect();
        render_list(&rows, self.output)?;
        if !self.output.is_json() {
            println!(
                "({} shown, status={}, search='{}')",
                rows.len(),
                self.filter.status(),
                self.filter.applied_query()
            );
        }
        Ok(())
    }
}

pub async fn run_session(
    password: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let app = App::open(project_root, output)?;
    if let Some(password) = password
        && let Err(err) = app.gate.login(password)
    {
        render_error(output, &CliError::from(&err))?;
    }

    let sync = app.sync();
    sync.activate().await;
    let mut updates = sync.watch();
    let mut seen = Seen::of(&updates.borrow_and_update());

    let mut session = Session {
        app: &app,
        sync,
        filter: TaskFilter::new(app.config.sync.search_debounce()),
        output,
    };
    println!("{HELP}");
    session.print_tasks()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(command) => {
                        if !session.handle(command).await? {
                            break;
                        }
                    }
                    Err(err) => render_error(output, &err)?,
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if let Some(notice) = sync_notice(&seen, &state) {
                    println!("\n{notice}");
                }
                seen = Seen::of(&state);
            }
        }
    }

    session.sync.deactivate();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  list "), Ok(SessionCommand::List));
        assert_eq!(
            parse_command("filter blocked"),
            Ok(SessionCommand::Filter(StatusFilter::Only(Status::Blocked)))
        );
        assert_eq!(
            parse_command("search  auth flow"),
            Ok(SessionCommand::Search("auth flow".into()))
        );
        assert_eq!(
            parse_command("status task_007 in-progress"),
            Ok(SessionCommand::SetStatus {
                id: "task_007".into(),
                status: Status::InProgress
            })
        );
        assert_eq!(parse_command(""), Ok(SessionCommand::Empty));
        assert_eq!(parse_command("exit"), Ok(SessionCommand::Quit));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_command("status task_007").is_err());
        assert!(parse_command("status task_007 done").is_err());
        assert!(parse_command("filter nope").is_err());
        assert_eq!(parse_command("login").unwrap_err().error_code, None);
        assert!(parse_command("login").is_err());
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn unknown_enum_values_carry_their_code() {
        let err = parse_command("status task_007 done").unwrap_err();
        assert_eq!(err.error_code.as_deref(), Some("E2005"));
        assert_eq!(err.message, "invalid status: 'done'");
        assert!(err.suggestion.is_some());

        let err = parse_command("filter nope").unwrap_err();
        assert_eq!(err.error_code.as_deref(), Some("E2005"));
    }

    #[test]
    fn notices_report_errors_before_syncs() {
        let previous = Seen::default();
        let mut state = SyncState {
            last_sync: Some(Utc::now()),
            ..SyncState::default()
        };
        assert_eq!(sync_notice(&previous, &state).as_deref(), Some("[sync] 0 tasks"));

        state.error = Some("store unavailable: offline".into());
        assert_eq!(
            sync_notice(&previous, &state).as_deref(),
            Some("[sync] store unavailable: offline")
        );

        let unchanged = Seen::of(&state);
        assert_eq!(sync_notice(&unchanged, &state), None);
    }
}
