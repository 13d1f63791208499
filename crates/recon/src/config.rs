use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SyncError;
use crate::model::EntityKind;
use crate::normalize::ColumnMap;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub name: String,
    pub store: StoreConfig,
    pub extracts: ExtractsConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Store + Extracts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractsConfig {
    pub teams: String,
    pub players: String,
    pub matches: String,
    pub transfers: String,
    pub player_stats: String,
    /// Per-extract raw -> canonical header overrides, keyed by extract name.
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnMap>,
}

impl ExtractsConfig {
    pub fn path(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Team => &self.teams,
            EntityKind::Player => &self.players,
            EntityKind::Match => &self.matches,
            EntityKind::PlayerStat => &self.player_stats,
            EntityKind::Transfer => &self.transfers,
        }
    }

    pub fn overrides(&self, kind: EntityKind) -> Option<&ColumnMap> {
        self.columns.get(kind.extract_name())
    }
}

// ---------------------------------------------------------------------------
// Validation, Schedule, Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_max_players")]
    pub max_players_per_team: usize,
}

fn default_max_players() -> usize {
    11
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_players_per_team: default_max_players(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    10
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub final_view_csv: Option<String>,
    #[serde(default)]
    pub report_json: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, SyncError> {
        let config: PipelineConfig =
            toml::from_str(input).map_err(|e| SyncError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.name.trim().is_empty() {
            return Err(SyncError::ConfigValidation("name must not be empty".into()));
        }
        if self.store.path.trim().is_empty() {
            return Err(SyncError::ConfigValidation("store.path must not be empty".into()));
        }

        for kind in EntityKind::ALL {
            if self.extracts.path(kind).trim().is_empty() {
                return Err(SyncError::ConfigValidation(format!(
                    "extracts.{} must not be empty",
                    kind.extract_name()
                )));
            }
        }

        // Overrides must name a known extract and map onto its canonical columns
        for (extract, map) in &self.extracts.columns {
            let kind = EntityKind::from_extract_name(extract).ok_or_else(|| {
                SyncError::ConfigValidation(format!("extracts.columns: unknown extract '{extract}'"))
            })?;
            for (raw, canonical) in map {
                if !kind.fields().iter().any(|f| f.name == canonical.as_str()) {
                    return Err(SyncError::ConfigValidation(format!(
                        "extracts.columns.{extract}: '{raw}' maps to unknown column '{canonical}'"
                    )));
                }
            }
        }

        if self.validation.max_players_per_team == 0 {
            return Err(SyncError::ConfigValidation(
                "validation.max_players_per_team must be greater than 0".into(),
            ));
        }
        if self.schedule.interval_secs == 0 {
            return Err(SyncError::ConfigValidation(
                "schedule.interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn extract_path(&self, kind: EntityKind) -> &str {
        self.extracts.path(kind)
    }

    pub fn column_overrides(&self, kind: EntityKind) -> Option<&ColumnMap> {
        self.extracts.overrides(kind)
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
