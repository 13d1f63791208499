use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::dataset::Dataset;
use crate::error::SyncError;
use crate::model::{PlayerStat, Table};

pub const FINAL_VIEW_TABLE: &str = "final_view";

pub const MINUTES_PER_MATCH: i64 = 90;
pub const HIGH_MINUTES_THRESHOLD: i64 = 300;
pub const HAT_TRICK_GOALS: i64 = 3;
pub const AGE_BAND: (f64, f64) = (25.0, 30.0);

pub const FRANCE: &str = "France";
pub const ITALY: &str = "Italy";

/// Column order of the materialized view.
pub const FINAL_VIEW_COLUMNS: [&str; 14] = [
    "player_id",
    "player_name",
    "team_name",
    "TotalGoals",
    "TotalAssists",
    "AverageMinutesPlayed",
    "PlayedOver300Min",
    "AgeBetween25And30",
    "Scored3PlusGoalsInMatch",
    "EstimatedMatchesPlayed",
    "PlayedInFrance",
    "DateJoinedFrenchTeam",
    "PlayedInItaly",
    "DateJoinedItalianTeam",
];

/// One player's row in the final analytical view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalViewRow {
    pub player_id: i64,
    pub player_name: Option<String>,
    pub team_name: Option<String>,
    #[serde(rename = "TotalGoals")]
    pub total_goals: i64,
    #[serde(rename = "TotalAssists")]
    pub total_assists: i64,
    #[serde(skip)]
    pub total_minutes: i64,
    #[serde(rename = "AverageMinutesPlayed")]
    pub average_minutes: Option<f64>,
    #[serde(rename = "PlayedOver300Min", serialize_with = "as_flag")]
    pub played_over_300_min: bool,
    #[serde(rename = "AgeBetween25And30", serialize_with = "as_flag")]
    pub age_between_25_and_30: bool,
    #[serde(rename = "Scored3PlusGoalsInMatch", serialize_with = "as_flag")]
    pub scored_3_plus_in_match: bool,
    #[serde(rename = "EstimatedMatchesPlayed")]
    pub estimated_matches_played: String,
    #[serde(rename = "PlayedInFrance", serialize_with = "as_flag")]
    pub played_in_france: bool,
    #[serde(rename = "DateJoinedFrenchTeam")]
    pub date_joined_french_team: Option<NaiveDate>,
    #[serde(rename = "PlayedInItaly", serialize_with = "as_flag")]
    pub played_in_italy: bool,
    #[serde(rename = "DateJoinedItalianTeam")]
    pub date_joined_italian_team: Option<NaiveDate>,
}

/// Flags are stored as 0/1.
fn as_flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

/// Per-player stat rollup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatTotals {
    pub goals: i64,
    pub assists: i64,
    pub minutes: i64,
    pub rows: usize,
    /// Rows with a minutes value; the mean skips nulls.
    pub minute_rows: usize,
    pub max_goals_in_match: i64,
}

impl StatTotals {
    /// Mean minutes over rows that report them. A player with no stat rows
    /// averages zero; one whose rows all lack minutes has no average.
    pub fn average_minutes(&self) -> Option<f64> {
        match (self.rows, self.minute_rows) {
            (0, _) => Some(0.0),
            (_, 0) => None,
            (_, n) => Some(self.minutes as f64 / n as f64),
        }
    }
}

/// Group stat rows by player.
pub fn aggregate_stats<'a>(stats: impl IntoIterator<Item = &'a PlayerStat>) -> BTreeMap<i64, StatTotals> {
    let mut groups: BTreeMap<i64, StatTotals> = BTreeMap::new();
    for stat in stats {
        let Some(player_id) = stat.player_id else {
            continue;
        };
        let entry = groups.entry(player_id).or_default();
        entry.rows += 1;
        let goals = stat.goals.unwrap_or(0);
        entry.goals += goals;
        entry.assists += stat.assists.unwrap_or(0);
        if let Some(mins) = stat.mins_played {
            entry.minutes += mins;
            entry.minute_rows += 1;
        }
        entry.max_goals_in_match = entry.max_goals_in_match.max(goals);
    }
    groups
}

/// `"{quotient} match {remainder} mins"` over 90-minute matches.
pub fn estimated_matches(total_minutes: i64) -> String {
    format!(
        "{} match {} mins",
        total_minutes.div_euclid(MINUTES_PER_MATCH),
        total_minutes.rem_euclid(MINUTES_PER_MATCH)
    )
}

/// Age in years approximated as elapsed days / 365, checked against the
/// inclusive 25-30 band.
pub fn in_age_band(birthdate: Option<NaiveDate>, today: NaiveDate) -> bool {
    let Some(born) = birthdate else {
        return false;
    };
    let years = (today - born).num_days() as f64 / 365.0;
    (AGE_BAND.0..=AGE_BAND.1).contains(&years)
}

/// Whether each player played in `country`, and when they first joined a
/// team there by transfer.
///
/// A player qualifies through any transfer into a team of that country, or
/// through their current team. The join date is the earliest qualifying
/// transfer date; it stays `None` when only the current team qualifies.
pub fn country_presence(data: &Dataset, country: &str) -> BTreeMap<i64, Option<NaiveDate>> {
    let teams: BTreeSet<i64> = data
        .teams
        .iter()
        .filter(|t| t.country.as_deref() == Some(country))
        .map(|t| t.team_id)
        .collect();

    let mut presence: BTreeMap<i64, Option<NaiveDate>> = BTreeMap::new();
    for transfer in data.transfers.iter() {
        let (Some(player_id), Some(to_team)) = (transfer.player_id, transfer.to_team_id) else {
            continue;
        };
        if !teams.contains(&to_team) {
            continue;
        }
        let joined = presence.entry(player_id).or_insert(None);
        *joined = match (*joined, transfer.trans_date) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
    for player in data.players.iter() {
        if player.team_id.is_some_and(|t| teams.contains(&t)) {
            presence.entry(player.player_id).or_insert(None);
        }
    }
    presence
}

/// Build the final view: one row per player, players without stat rows
/// included with zero metrics. Rows are ordered by player id.
pub fn build_final_view(data: &Dataset, today: NaiveDate) -> Vec<FinalViewRow> {
    let totals = aggregate_stats(data.player_stats.iter());
    let france = country_presence(data, FRANCE);
    let italy = country_presence(data, ITALY);

    let player_ids: BTreeSet<i64> = data.players.keys().chain(totals.keys().copied()).collect();

    player_ids
        .into_iter()
        .map(|player_id| {
            let player = data.players.get(player_id);
            let stats = totals.get(&player_id).cloned().unwrap_or_default();
            let team_name = player
                .and_then(|p| p.team_id)
                .and_then(|t| data.teams.get(t))
                .and_then(|t| t.team_name.clone());

            FinalViewRow {
                player_id,
                player_name: player.and_then(|p| p.player_name.clone()),
                team_name,
                total_goals: stats.goals,
                total_assists: stats.assists,
                total_minutes: stats.minutes,
                average_minutes: stats.average_minutes(),
                played_over_300_min: stats.minutes > HIGH_MINUTES_THRESHOLD,
                age_between_25_and_30: in_age_band(player.and_then(|p| p.birthdate), today),
                scored_3_plus_in_match: stats.max_goals_in_match >= HAT_TRICK_GOALS,
                estimated_matches_played: estimated_matches(stats.minutes),
                played_in_france: france.contains_key(&player_id),
                date_joined_french_team: france.get(&player_id).copied().flatten(),
                played_in_italy: italy.contains_key(&player_id),
                date_joined_italian_team: italy.get(&player_id).copied().flatten(),
            }
        })
        .collect()
}

pub fn final_view_table(rows: &[FinalViewRow]) -> Result<Table, SyncError> {
    Table::from_records(
        FINAL_VIEW_TABLE,
        FINAL_VIEW_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    )
}
