//! `rostersync run | schedule | validate`

use std::path::{Path, PathBuf};
use std::time::Duration;

use rostersync_io::csv::{export_final_view, load_extracts};
use rostersync_io::export::{write_cleaning_log, write_report_json};
use rostersync_io::SqliteStore;
use rostersync_recon::config::{resolve_path, PipelineConfig};
use rostersync_recon::report::ViolationKind;
use rostersync_recon::{EntityKind, RunOutcome, RunReport};
use tracing::{error, info};

use crate::exit_codes::{EXIT_ERROR, EXIT_EXTRACT};
use crate::CliError;

/// A validated config plus the directory its relative paths resolve against.
struct Loaded {
    config: PipelineConfig,
    base_dir: PathBuf,
}

impl Loaded {
    fn path(&self, p: &str) -> PathBuf {
        resolve_path(&self.base_dir, p)
    }
}

fn load_config(config_path: &Path) -> Result<Loaded, CliError> {
    let text = std::fs::read_to_string(config_path)
        .map_err(|e| CliError::config(format!("cannot read config {}: {e}", config_path.display())))?;
    let config = PipelineConfig::from_toml(&text)?;
    let base_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    Ok(Loaded { config, base_dir })
}

/// One full run: load extracts, reconcile into the store, write the
/// configured exports.
fn run_once(loaded: &Loaded) -> Result<RunOutcome, CliError> {
    let extracts = load_extracts(&loaded.config, &loaded.base_dir)?;
    let mut store = SqliteStore::open(&loaded.path(&loaded.config.store.path))?;
    let outcome = rostersync_recon::run(&mut store, &extracts, &loaded.config.validation)?;

    let output = &loaded.config.output;
    if let Some(ref log) = output.log_file {
        write_cleaning_log(&outcome.report, &loaded.path(log))?;
    }
    if let Some(ref csv) = output.final_view_csv {
        export_final_view(&outcome.final_view, &loaded.path(csv))?;
    }
    if let Some(ref json) = output.report_json {
        write_report_json(&outcome.report, &loaded.path(json))?;
    }
    Ok(outcome)
}

fn print_summary(report: &RunReport) {
    eprintln!(
        "run {}: {} referential, {} domain, {} capacity; history +{} updated, +{} deleted",
        report.run_at,
        report.violation_count(ViolationKind::ReferentialViolation),
        report.violation_count(ViolationKind::DomainViolation),
        report.violation_count(ViolationKind::CapacityWarning),
        report.history.updated,
        report.history.deleted,
    );
    for count in &report.counts {
        eprintln!("  {:<17} {:>6} -> {:<6}", count.table, count.before, count.after);
    }
}

pub fn cmd_run(config_path: PathBuf, json_output: bool, output_file: Option<PathBuf>) -> Result<(), CliError> {
    let loaded = load_config(&config_path)?;
    let outcome = run_once(&loaded)?;

    if let Some(ref path) = output_file {
        write_report_json(&outcome.report, path)?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        let json = serde_json::to_string_pretty(&outcome.report).map_err(|e| CliError {
            code: EXIT_ERROR,
            message: format!("JSON serialization error: {e}"),
            hint: None,
        })?;
        println!("{json}");
    } else {
        print!("{}", outcome.report.render_text());
    }

    print_summary(&outcome.report);
    Ok(())
}

pub fn cmd_schedule(config_path: PathBuf, interval: Option<u64>, max_runs: Option<u64>) -> Result<(), CliError> {
    let loaded = load_config(&config_path)?;
    let secs = interval.unwrap_or(loaded.config.schedule.interval_secs);
    if secs == 0 {
        return Err(CliError::config("--interval must be greater than 0"));
    }
    let period = Duration::from_secs(secs);
    info!(config = %loaded.config.name, interval_secs = secs, "scheduler started");

    let mut runs: u64 = 0;
    let mut failures: u64 = 0;
    loop {
        runs += 1;
        // The next run is only scheduled once this one has committed or failed
        match run_once(&loaded) {
            Ok(outcome) => {
                info!(run = runs, run_at = %outcome.report.run_at, "scheduled run committed");
                print_summary(&outcome.report);
            }
            Err(e) => {
                failures += 1;
                error!(run = runs, code = e.code, error = %e.message, "scheduled run failed");
            }
        }

        if max_runs.is_some_and(|max| runs >= max) {
            break;
        }
        std::thread::sleep(period);
    }

    info!(runs, failures, "scheduler stopped");
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let loaded = load_config(&config_path)?;

    for kind in EntityKind::ALL {
        let path = loaded.path(loaded.config.extract_path(kind));
        if !path.is_file() {
            return Err(CliError {
                code: EXIT_EXTRACT,
                message: format!("{} extract not found: {}", kind.display_name(), path.display()),
                hint: None,
            }
            .with_hint(format!("check extracts.{} in {}", kind.extract_name(), config_path.display())));
        }
    }

    eprintln!(
        "config ok: {} (store {})",
        loaded.config.name,
        loaded.path(&loaded.config.store.path).display()
    );
    Ok(())
}
