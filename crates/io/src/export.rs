// Run report sinks: the text cleaning log and the JSON report

use std::path::Path;

use rostersync_recon::RunReport;

use crate::error::IoError;

/// Rewrite the cleaning log with this run's grids.
pub fn write_cleaning_log(report: &RunReport, path: &Path) -> Result<(), IoError> {
    std::fs::write(path, report.render_text()).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_report_json(report: &RunReport, path: &Path) -> Result<(), IoError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json + "\n").map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}
