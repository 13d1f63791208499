//! Integrity validation.
//!
//! Pass 1 (referential) runs on the synchronized working set before it is
//! persisted: rows whose `player_id` has no parent are quarantined and
//! excluded. Pass 2 (domain) runs on the set re-read from the store: stat
//! rows breaking a card rule are quarantined *and* corrected in place, and
//! oversized rosters are flagged without touching the team row.
//!
//! Every quarantine or flag is recorded in the report at the point it is
//! acted on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::error::SyncError;
use crate::model::{Entity, Player, PlayerRef, PlayerStat, Snapshot, Table, Team, Transfer};
use crate::report::{ReportBuilder, ViolationKind};

pub const PLAYER_FK_REASON: &str = "ForeignKeyViolation: player_id not present in players table";

/// A quarantined row: the record as it was, plus why it was pulled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quarantined<E> {
    #[serde(flatten)]
    pub record: E,
    pub reason: String,
}

pub fn error_columns<E: Entity>() -> Vec<String> {
    let mut columns = E::KIND.columns();
    columns.push("reason".into());
    columns
}

/// Encode quarantined rows for the entity's error sink.
pub fn error_table<E: Entity>(rows: &[Quarantined<E>]) -> Result<Table, SyncError> {
    Table::from_records(E::KIND.error_table_name(), error_columns::<E>(), rows)
}

// ---------------------------------------------------------------------------
// Pass 1: referential
// ---------------------------------------------------------------------------

/// Rows removed from the working set by the referential pass.
#[derive(Debug, Clone, Default)]
pub struct ReferentialOutcome {
    pub transfers: Vec<Quarantined<Transfer>>,
    pub player_stats: Vec<Quarantined<PlayerStat>>,
}

/// Remove rows whose `player_id` is null or not in `players`, returning them
/// tagged with the foreign-key reason.
pub fn quarantine_orphans<E: Entity + PlayerRef>(
    rows: &mut Snapshot<E>,
    players: &BTreeSet<i64>,
    report: &mut ReportBuilder,
) -> Vec<Quarantined<E>> {
    let orphans: Vec<i64> = rows
        .iter()
        .filter(|r| !r.player_id().is_some_and(|id| players.contains(&id)))
        .map(|r| r.key())
        .collect();

    let mut quarantined = Vec::with_capacity(orphans.len());
    for key in orphans {
        if let Some(record) = rows.remove(key) {
            warn!(
                entity = %E::KIND,
                row_id = key,
                player_id = ?record.player_id(),
                "quarantined: dangling player_id"
            );
            report.record_violation(E::KIND, key, ViolationKind::ReferentialViolation, PLAYER_FK_REASON);
            quarantined.push(Quarantined {
                record,
                reason: PLAYER_FK_REASON.to_string(),
            });
        }
    }
    quarantined
}

/// Quarantine transfers and stat rows that reference a player absent from
/// the working set's player table.
pub fn enforce_referential(data: &mut Dataset, report: &mut ReportBuilder) -> ReferentialOutcome {
    let players: BTreeSet<i64> = data.players.keys().collect();
    let outcome = ReferentialOutcome {
        transfers: quarantine_orphans(&mut data.transfers, &players, report),
        player_stats: quarantine_orphans(&mut data.player_stats, &players, report),
    };
    info!(
        transfers = outcome.transfers.len(),
        player_stats = outcome.player_stats.len(),
        "referential pass complete"
    );
    outcome
}

// ---------------------------------------------------------------------------
// Pass 2: stat card rules
// ---------------------------------------------------------------------------

/// A domain rule on stat rows: how to detect a violation and how to fix it.
pub struct StatRule {
    pub name: &'static str,
    pub reason: &'static str,
    pub violates: fn(&PlayerStat) -> bool,
    pub correct: fn(&mut PlayerStat),
}

/// Card rules, in application order. Corrections run in this order over
/// the whole working set, so a row clamped by `yellow_cards_max` (3 -> 2)
/// then receives the red card from `second_yellow_means_red`.
pub const STAT_RULES: [StatRule; 3] = [
    StatRule {
        name: "red_cards_max",
        reason: "Red Cards greater than 1, should be 1",
        violates: |s| s.red_cards.is_some_and(|r| r > 1),
        correct: |s| s.red_cards = Some(1),
    },
    StatRule {
        name: "yellow_cards_max",
        reason: "Yellow Cards greater than 2, should be maximum 2",
        violates: |s| s.yellow_cards.is_some_and(|y| y > 2),
        correct: |s| s.yellow_cards = Some(2),
    },
    StatRule {
        name: "second_yellow_means_red",
        reason: "If there are any yellow cards = 2, then player should have a red card",
        violates: |s| s.yellow_cards == Some(2) && s.red_cards != Some(1),
        correct: |s| s.red_cards = Some(1),
    },
];

/// Rows violating each rule, evaluated on the uncorrected set, grouped by
/// rule. A row breaking several rules appears once per rule.
pub fn flag_stat_rows(rows: &Snapshot<PlayerStat>, rules: &[StatRule]) -> Vec<Quarantined<PlayerStat>> {
    rules
        .iter()
        .flat_map(|rule| {
            rows.iter().filter(move |s| (rule.violates)(s)).map(move |s| Quarantined {
                record: s.clone(),
                reason: rule.reason.to_string(),
            })
        })
        .collect()
}

/// Apply each rule's correction, in rule order, to every row that violates
/// it at that point.
pub fn correct_stat_rows(rows: &mut Snapshot<PlayerStat>, rules: &[StatRule]) {
    for rule in rules {
        for stat in rows.iter_mut() {
            if (rule.violates)(stat) {
                (rule.correct)(stat);
            }
        }
    }
}

/// Flag, record, then correct. Returns the flagged rows for the error sink.
pub fn enforce_stat_rules(rows: &mut Snapshot<PlayerStat>, report: &mut ReportBuilder) -> Vec<Quarantined<PlayerStat>> {
    let flagged = flag_stat_rows(rows, &STAT_RULES);
    for q in &flagged {
        warn!(stat_id = q.record.stat_id, reason = %q.reason, "stat row corrected");
        report.record_violation(
            PlayerStat::KIND,
            q.record.stat_id,
            ViolationKind::DomainViolation,
            q.reason.clone(),
        );
    }
    correct_stat_rows(rows, &STAT_RULES);
    info!(flagged = flagged.len(), "stat rules applied");
    flagged
}

// ---------------------------------------------------------------------------
// Pass 2: roster size
// ---------------------------------------------------------------------------

pub fn roster_reason(limit: usize) -> String {
    format!("Team has more than {limit} players")
}

/// Flag teams with more than `limit` players. Flag only: `teams` is not
/// modified.
pub fn flag_oversized_teams(
    teams: &Snapshot<Team>,
    players: &Snapshot<Player>,
    limit: usize,
    report: &mut ReportBuilder,
) -> Vec<Quarantined<Team>> {
    let mut roster: BTreeMap<i64, usize> = BTreeMap::new();
    for team_id in players.iter().filter_map(|p| p.team_id) {
        *roster.entry(team_id).or_insert(0) += 1;
    }

    let reason = roster_reason(limit);
    teams
        .iter()
        .filter(|t| roster.get(&t.team_id).is_some_and(|n| *n > limit))
        .map(|t| {
            warn!(team_id = t.team_id, players = roster[&t.team_id], "roster over limit");
            report.record_violation(Team::KIND, t.team_id, ViolationKind::CapacityWarning, reason.clone());
            Quarantined {
                record: t.clone(),
                reason: reason.clone(),
            }
        })
        .collect()
}
