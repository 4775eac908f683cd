#![forbid(unsafe_code)]

mod app;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{OutputMode, resolve_output_mode};
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tb: live task-tracking dashboard",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty, text or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for --format json.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Tester password for mutating commands (or TRACKBOARD_PASSWORD).
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Write the initial task set",
        long_about = "Write the fixed initial task set if the store has no tasks.",
        after_help = "EXAMPLES:\n    # Seed an empty store\n    tb seed --password tester\n\n    # Overwrite the seeded tasks\n    tb seed --force"
    )]
    Seed(cmd::seed::SeedArgs),

    #[command(
        next_help_heading = "Read",
        about = "List tasks",
        long_about = "List tasks in day order with optional status and text filters.",
        after_help = "EXAMPLES:\n    # All tasks\n    tb list\n\n    # Blocked tasks mentioning auth\n    tb list --status blocked --search auth\n\n    # Emit machine-readable output\n    tb list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one task",
        after_help = "EXAMPLES:\n    tb show task_007"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Tester",
        about = "Change a task's status",
        after_help = "EXAMPLES:\n    # Complete a task\n    tb status task_007 completed --actual-hours 3\n\n    # Block with notes\n    tb status task_012 blocked --findings \"waiting on certs\""
    )]
    Status(cmd::status::StatusArgs),

    #[command(
        next_help_heading = "Tester",
        about = "Edit task fields",
        after_help = "EXAMPLES:\n    tb update task_004 --assignee sam --priority critical"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(next_help_heading = "Tester", about = "Delete a task")]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Gate",
        about = "Check the tester password",
        long_about = "Check the tester password. Repeated failures lock the gate for a while."
    )]
    Login(cmd::gate::LoginArgs),

    #[command(next_help_heading = "Gate", about = "Show gate attempts and lockout")]
    Gate,

    #[command(
        next_help_heading = "Interactive",
        about = "Open a live dashboard session",
        long_about = "Keep a live subscription open and accept commands on stdin."
    )]
    Session,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TRACKBOARD_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "trackboard=debug,info"
        } else {
            "trackboard=info,warn"
        })
    });

    let format = env::var("TRACKBOARD_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let output = cli.output_mode();
    let password = cli.password();

    match &cli.command {
        Commands::Seed(args) => cmd::seed::run_seed(args, password, output, &project_root).await,
        Commands::List(args) => cmd::list::run_list(args, output, &project_root).await,
        Commands::Show(args) => cmd::show::run_show(args, output, &project_root).await,
        Commands::Status(args) => {
            cmd::status::run_status(args, password, output, &project_root).await
        }
        Commands::Update(args) => {
            cmd::update::run_update(args, password, output, &project_root).await
        }
        Commands::Delete(args) => {
            cmd::delete::run_delete(args, password, output, &project_root).await
        }
        Commands::Login(args) => cmd::gate::run_login(args, password, output, &project_root),
        Commands::Gate => cmd::gate::run_gate(output, &project_root),
        Commands::Session => cmd::session::run_session(password, output, &project_root).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["tb", "list", "--json"]);
        assert!(cli.json);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn format_flag_selects_mode() {
        let cli = Cli::parse_from(["tb", "--format", "text", "gate"]);
        assert_eq!(cli.output_mode(), OutputMode::Text);
        assert!(matches!(cli.command, Commands::Gate));
    }

    #[test]
    fn password_is_global() {
        let cli = Cli::parse_from(["tb", "status", "task_001", "blocked", "--password", "tester"]);
        assert_eq!(cli.password(), Some("tester"));
        assert!(matches!(cli.command, Commands::Status(_)));
    }
}
