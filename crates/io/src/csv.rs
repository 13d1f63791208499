// Extract loading and final view CSV export

use std::io::Read;
use std::path::Path;

use rostersync_recon::aggregate::{FinalViewRow, FINAL_VIEW_COLUMNS};
use rostersync_recon::config::{resolve_path, PipelineConfig};
use rostersync_recon::model::Entity;
use rostersync_recon::normalize::load_records;
use rostersync_recon::Extracts;
use tracing::info;

use crate::error::IoError;

/// Read a text file, accepting UTF-8 (with or without BOM) and falling back
/// to Windows-1252 for spreadsheet exports.
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let read_err = |source| IoError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(read_err)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(read_err)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(s)),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn load_extract<E: Entity>(config: &PipelineConfig, base_dir: &Path) -> Result<Vec<E>, IoError> {
    let path = resolve_path(base_dir, config.extract_path(E::KIND));
    let content = read_file_as_utf8(&path)?;
    let records = load_records(&content, config.column_overrides(E::KIND))?;
    info!(entity = %E::KIND, path = %path.display(), rows = records.len(), "extract loaded");
    Ok(records)
}

/// Read and normalize the five configured extracts. Relative paths resolve
/// against `base_dir`.
pub fn load_extracts(config: &PipelineConfig, base_dir: &Path) -> Result<Extracts, IoError> {
    Ok(Extracts {
        teams: load_extract(config, base_dir)?,
        players: load_extract(config, base_dir)?,
        matches: load_extract(config, base_dir)?,
        player_stats: load_extract(config, base_dir)?,
        transfers: load_extract(config, base_dir)?,
    })
}

/// Write the final view with a header row, in the view's fixed column order.
pub fn export_final_view(rows: &[FinalViewRow], path: &Path) -> Result<(), IoError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(FINAL_VIEW_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
