//! One end-to-end reconciliation run.
//!
//! The orchestrator owns ordering: history before any state change, the raw
//! replace before validation reads it back, and the cleaned tables before
//! the final view. Error sinks are only written once the raw replace has
//! committed. Any error returned from [`run_at`] aborts the run; what was
//! committed before the failing stage stays committed.

use chrono::{Local, NaiveDateTime};
use tracing::{error, info};

use crate::aggregate::{build_final_view, final_view_table, FinalViewRow};
use crate::config::ValidationConfig;
use crate::dataset::{Dataset, TableSet};
use crate::diff::diff_snapshots;
use crate::error::SyncError;
use crate::history::record_history;
use crate::model::{Entity, EntityKind, Match, Player, PlayerStat, Snapshot, Team, Transfer};
use crate::normalize::load_records;
use crate::report::{ReportBuilder, RunReport};
use crate::store::{Store, WriteMode};
use crate::sync::synchronize_all;
use crate::validate::{enforce_referential, enforce_stat_rules, error_table, flag_oversized_teams, Quarantined};

/// The five normalized extracts of one run, in extract order.
#[derive(Debug, Clone, Default)]
pub struct Extracts {
    pub teams: Vec<Team>,
    pub players: Vec<Player>,
    pub matches: Vec<Match>,
    pub player_stats: Vec<PlayerStat>,
    pub transfers: Vec<Transfer>,
}

impl Extracts {
    /// Normalize five CSV documents with the default column mappings.
    pub fn from_csv(
        teams: &str,
        players: &str,
        matches: &str,
        player_stats: &str,
        transfers: &str,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            teams: load_records(teams, None)?,
            players: load_records(players, None)?,
            matches: load_records(matches, None)?,
            player_stats: load_records(player_stats, None)?,
            transfers: load_records(transfers, None)?,
        })
    }

    /// Rows as extracted, duplicates included.
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Team => self.teams.len(),
            EntityKind::Player => self.players.len(),
            EntityKind::Match => self.matches.len(),
            EntityKind::PlayerStat => self.player_stats.len(),
            EntityKind::Transfer => self.transfers.len(),
        }
    }

    /// Keyed snapshots; a later row wins over an earlier one with the same key.
    pub fn to_dataset(&self) -> Dataset {
        Dataset {
            teams: self.teams.iter().cloned().collect::<Snapshot<_>>(),
            players: self.players.iter().cloned().collect(),
            matches: self.matches.iter().cloned().collect(),
            player_stats: self.player_stats.iter().cloned().collect(),
            transfers: self.transfers.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub final_view: Vec<FinalViewRow>,
    pub cleaned: Dataset,
}

/// Run the pipeline stamped with the current local time.
pub fn run<S: Store + ?Sized>(
    store: &mut S,
    extracts: &Extracts,
    validation: &ValidationConfig,
) -> Result<RunOutcome, SyncError> {
    run_at(store, extracts, validation, Local::now().naive_local())
}

/// Run the pipeline with an explicit run timestamp. The timestamp stamps
/// history entries and the report, and its date anchors age computations.
pub fn run_at<S: Store + ?Sized>(
    store: &mut S,
    extracts: &Extracts,
    validation: &ValidationConfig,
    now: NaiveDateTime,
) -> Result<RunOutcome, SyncError> {
    let mut report = ReportBuilder::new(now);
    let incoming = extracts.to_dataset();
    let persisted = Dataset::read(store, TableSet::Raw)?;

    // History first: nothing below may change state without an audit trail
    let player_diff = diff_snapshots(&persisted.players, &incoming.players)?;
    record_history(store, &player_diff, now)?;
    report.record_history(player_diff.updated.len(), player_diff.deleted.len());
    info!(
        updated = player_diff.updated.len(),
        deleted = player_diff.deleted.len(),
        inserted = player_diff.inserted.len(),
        "player diff recorded"
    );

    let mut synced = synchronize_all(&persisted, &incoming);

    // Quarantined rows stay in memory until the raw replace commits
    let orphans = enforce_referential(&mut synced, &mut report);

    synced.persist(store, TableSet::Raw).map_err(|e| {
        error!(error = %e, "raw table replace rolled back");
        e
    })?;
    info!(
        teams = synced.teams.len(),
        players = synced.players.len(),
        matches = synced.matches.len(),
        player_stats = synced.player_stats.len(),
        transfers = synced.transfers.len(),
        "raw tables replaced"
    );
    write_errors(store, &orphans.transfers)?;

    let mut cleaned = Dataset::read(store, TableSet::Raw)?;

    let oversized = flag_oversized_teams(
        &cleaned.teams,
        &cleaned.players,
        validation.max_players_per_team,
        &mut report,
    );
    write_errors(store, &oversized)?;

    let corrected = enforce_stat_rules(&mut cleaned.player_stats, &mut report);
    let stat_errors: Vec<Quarantined<PlayerStat>> =
        orphans.player_stats.into_iter().chain(corrected).collect();
    write_errors(store, &stat_errors)?;

    for kind in EntityKind::ALL {
        report.record_count(kind, extracts.count(kind), cleaned.count(kind));
    }

    cleaned.persist(store, TableSet::Cleaned).map_err(|e| {
        error!(error = %e, "cleaned table replace rolled back");
        e
    })?;
    info!("cleaned tables replaced");

    let final_view = build_final_view(&cleaned, now.date());
    store.write_table(&final_view_table(&final_view)?, WriteMode::Replace)?;
    info!(rows = final_view.len(), "final view replaced");

    Ok(RunOutcome {
        report: report.finish(),
        final_view,
        cleaned,
    })
}

/// Replace an entity's error sink with `rows`.
fn write_errors<E: Entity, S: Store + ?Sized>(
    store: &mut S,
    rows: &[Quarantined<E>],
) -> Result<(), SyncError> {
    store.write_table(&error_table(rows)?, WriteMode::Replace)?;
    Ok(())
}
