// rostersync CLI - reconcile league extracts into a persisted store

mod exit_codes;
mod run;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{io_exit_code, sync_exit_code, EXIT_INVALID_CONFIG, EXIT_SUCCESS};
use rostersync_io::IoError;
use rostersync_recon::SyncError;

#[derive(Parser)]
#[command(name = "rostersync")]
#[command(about = "Snapshot reconciliation for league datasets: diff, history, sync, validate, aggregate")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log debug events (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once
    #[command(after_help = "\
Examples:
  rostersync run league.toml
  rostersync run league.toml --json
  rostersync run league.toml --output report.json")]
    Run {
        /// Path to the pipeline TOML config
        config: PathBuf,

        /// Print the run report as JSON to stdout instead of the cleaning log
        #[arg(long)]
        json: bool,

        /// Write the JSON run report to a file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the pipeline on a fixed interval; runs never overlap
    #[command(after_help = "\
Examples:
  rostersync schedule league.toml
  rostersync schedule league.toml --interval 60
  rostersync schedule league.toml --interval 1 --max-runs 3")]
    Schedule {
        /// Path to the pipeline TOML config
        config: PathBuf,

        /// Seconds between runs (overrides [schedule] interval_secs)
        #[arg(long, env = "ROSTERSYNC_INTERVAL")]
        interval: Option<u64>,

        /// Stop after this many runs
        #[arg(long)]
        max_runs: Option<u64>,
    },

    /// Validate a config and check its extracts exist, without running
    #[command(after_help = "\
Examples:
  rostersync validate league.toml")]
    Validate {
        /// Path to the pipeline TOML config
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  rostersync-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .compact()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, json, output } => run::cmd_run(config, json, output),
        Commands::Schedule { config, interval, max_runs } => run::cmd_schedule(config, interval, max_runs),
        Commands::Validate { config } => run::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INVALID_CONFIG, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn sync_hint(err: &SyncError) -> Option<&'static str> {
    match err {
        SyncError::MissingColumn { .. } => {
            Some("map the raw header under [extracts.columns.<extract>] in the config")
        }
        SyncError::Transaction(_) => Some("the tables were rolled back to their state before this run"),
        SyncError::AuditWrite(_) => Some("check the store is writable; no table was changed"),
        _ => None,
    }
}

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        Self {
            code: sync_exit_code(&err),
            hint: sync_hint(&err).map(String::from),
            message: err.to_string(),
        }
    }
}

impl From<IoError> for CliError {
    fn from(err: IoError) -> Self {
        let hint = match &err {
            IoError::Sync(e) => sync_hint(e).map(String::from),
            _ => None,
        };
        Self {
            code: io_exit_code(&err),
            message: err.to_string(),
            hint,
        }
    }
}
