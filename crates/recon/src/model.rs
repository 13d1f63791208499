use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Cells + tables
// ---------------------------------------------------------------------------

/// A single stored cell. Dates travel as `YYYY-MM-DD` text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Real(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Int(i64::from(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Real).unwrap_or(Self::Null),
            },
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(n) => write!(f, "{n}"),
            Self::Real(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A named, column-ordered table: the unit of exchange with a [`crate::store::Store`].
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Cells of one column, in row order. Empty if the column is absent.
    pub fn column_values<'a>(&'a self, column: &str) -> Vec<&'a Value> {
        match self.column_index(column) {
            Some(i) => self.rows.iter().filter_map(|r| r.get(i)).collect(),
            None => Vec::new(),
        }
    }

    /// Encode typed records into rows. Fields are looked up by column name;
    /// a column with no matching field is stored as null.
    pub fn from_records<T: Serialize>(
        name: impl Into<String>,
        columns: Vec<String>,
        records: &[T],
    ) -> Result<Self, SyncError> {
        let mut table = Self::new(name, columns);
        for record in records {
            let json = serde_json::to_value(record).map_err(|e| SyncError::Encode(e.to_string()))?;
            let obj = json
                .as_object()
                .ok_or_else(|| SyncError::Encode("record did not serialize to a map".into()))?;
            let row = table
                .columns
                .iter()
                .map(|c| obj.get(c).map(Value::from_json).unwrap_or(Value::Null))
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Decode rows into typed records. Columns unknown to `T` are ignored.
    pub fn to_records<T: DeserializeOwned>(&self) -> Result<Vec<T>, SyncError> {
        self.rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.clone(), v.to_json()))
                    .collect();
                serde_json::from_value(serde_json::Value::Object(obj)).map_err(|e| SyncError::Decode {
                    table: self.name.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Entity schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Real,
    Text,
    Date,
}

/// One canonical column and the raw extract header it is read from by default.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub raw: &'static str,
    pub ty: FieldType,
}

const fn field(name: &'static str, raw: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec { name, raw, ty }
}

const TEAM_FIELDS: &[FieldSpec] = &[
    field("team_id", "TeamID", FieldType::Int),
    field("team_name", "TeamName", FieldType::Text),
    field("founded_year", "FoundedYear", FieldType::Int),
    field("home_city", "HomeCity", FieldType::Text),
    field("manager_name", "ManagerName", FieldType::Text),
    field("stadium_name", "StadiumName", FieldType::Text),
    field("stadium_capacity", "StadiumCapacity", FieldType::Int),
    field("country", "Country", FieldType::Text),
];

const PLAYER_FIELDS: &[FieldSpec] = &[
    field("player_id", "PlayerID", FieldType::Int),
    field("team_id", "TeamID", FieldType::Int),
    field("player_name", "Name", FieldType::Text),
    field("position", "Position", FieldType::Text),
    field("birthdate", "DateOfBirth", FieldType::Date),
    field("nationality", "Nationality", FieldType::Text),
    field("contract_until", "ContractUntil", FieldType::Text),
    field("market_value", "MarketValue", FieldType::Real),
];

const MATCH_FIELDS: &[FieldSpec] = &[
    field("match_id", "MatchID", FieldType::Int),
    field("match_date", "Date", FieldType::Date),
    field("home_team_id", "HomeTeamID", FieldType::Int),
    field("away_team_id", "AwayTeamID", FieldType::Int),
    field("home_team_score", "HomeTeamScore", FieldType::Int),
    field("away_team_score", "AwayTeamScore", FieldType::Int),
    field("stadium", "Stadium", FieldType::Text),
    field("referee", "Referee", FieldType::Text),
];

const PLAYER_STAT_FIELDS: &[FieldSpec] = &[
    field("stat_id", "StatID", FieldType::Int),
    field("player_id", "PlayerID", FieldType::Int),
    field("match_id", "MatchID", FieldType::Int),
    field("goals", "Goals", FieldType::Int),
    field("assists", "Assists", FieldType::Int),
    field("yellow_cards", "YellowCards", FieldType::Int),
    field("red_cards", "RedCards", FieldType::Int),
    field("mins_played", "MinutesPlayed", FieldType::Int),
];

const TRANSFER_FIELDS: &[FieldSpec] = &[
    field("trans_id", "TransferID", FieldType::Int),
    field("player_id", "PlayerID", FieldType::Int),
    field("from_team_id", "FromTeamID", FieldType::Int),
    field("to_team_id", "ToTeamID", FieldType::Int),
    field("trans_date", "TransferDate", FieldType::Date),
    field("trans_fee", "TransferFee", FieldType::Real),
    field("contract_duration", "ContractDuration", FieldType::Int),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Team,
    Player,
    Match,
    PlayerStat,
    Transfer,
}

impl EntityKind {
    /// Parent-first order: the insert order of a table set.
    pub const ALL: [EntityKind; 5] = [
        Self::Team,
        Self::Player,
        Self::Match,
        Self::PlayerStat,
        Self::Transfer,
    ];

    /// Child-first order: the delete order of a table set.
    pub const DELETE_ORDER: [EntityKind; 5] = [
        Self::PlayerStat,
        Self::Transfer,
        Self::Match,
        Self::Player,
        Self::Team,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            Self::Team => "teams",
            Self::Player => "players",
            Self::Match => "matches",
            Self::PlayerStat => "player_stats",
            Self::Transfer => "transfer_history",
        }
    }

    pub fn cleaned_table_name(self) -> &'static str {
        match self {
            Self::Team => "cleaned_teams",
            Self::Player => "cleaned_players",
            Self::Match => "cleaned_matches",
            Self::PlayerStat => "cleaned_player_stats",
            Self::Transfer => "cleaned_transfer_history",
        }
    }

    /// Replace-on-write quarantine sink for this entity.
    pub fn error_table_name(self) -> String {
        format!("{}_errors", self.table_name())
    }

    /// Name of the extract in config files (`[extracts]` keys).
    pub fn extract_name(self) -> &'static str {
        match self {
            Self::Team => "teams",
            Self::Player => "players",
            Self::Match => "matches",
            Self::PlayerStat => "player_stats",
            Self::Transfer => "transfers",
        }
    }

    pub fn from_extract_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.extract_name() == name)
    }

    /// Human-facing name used in the cleaning log.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Team => "Teams",
            Self::Player => "Players",
            Self::Match => "Matches",
            Self::PlayerStat => "Player Stats",
            Self::Transfer => "Player Transfers",
        }
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Team => TEAM_FIELDS,
            Self::Player => PLAYER_FIELDS,
            Self::Match => MATCH_FIELDS,
            Self::PlayerStat => PLAYER_STAT_FIELDS,
            Self::Transfer => TRANSFER_FIELDS,
        }
    }

    /// The primary key is always the first declared field.
    pub fn key_column(self) -> &'static str {
        self.fields()[0].name
    }

    pub fn columns(self) -> Vec<String> {
        self.fields().iter().map(|f| f.name.to_string()).collect()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A typed record with a declared integer primary key.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned {
    const KIND: EntityKind;

    fn key(&self) -> i64;
}

/// Records carrying a `player_id` foreign key.
pub trait PlayerRef {
    fn player_id(&self) -> Option<i64>;
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: i64,
    pub team_name: Option<String>,
    pub founded_year: Option<i64>,
    pub home_city: Option<String>,
    pub manager_name: Option<String>,
    pub stadium_name: Option<String>,
    pub stadium_capacity: Option<i64>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: i64,
    pub team_id: Option<i64>,
    pub player_name: Option<String>,
    pub position: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub contract_until: Option<String>,
    pub market_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: i64,
    pub match_date: Option<NaiveDate>,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub home_team_score: Option<i64>,
    pub away_team_score: Option<i64>,
    pub stadium: Option<String>,
    pub referee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStat {
    pub stat_id: i64,
    pub player_id: Option<i64>,
    pub match_id: Option<i64>,
    pub goals: Option<i64>,
    pub assists: Option<i64>,
    pub yellow_cards: Option<i64>,
    pub red_cards: Option<i64>,
    pub mins_played: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub trans_id: i64,
    pub player_id: Option<i64>,
    pub from_team_id: Option<i64>,
    pub to_team_id: Option<i64>,
    pub trans_date: Option<NaiveDate>,
    pub trans_fee: Option<f64>,
    pub contract_duration: Option<i64>,
}

impl Entity for Team {
    const KIND: EntityKind = EntityKind::Team;
    fn key(&self) -> i64 {
        self.team_id
    }
}

impl Entity for Player {
    const KIND: EntityKind = EntityKind::Player;
    fn key(&self) -> i64 {
        self.player_id
    }
}

impl Entity for Match {
    const KIND: EntityKind = EntityKind::Match;
    fn key(&self) -> i64 {
        self.match_id
    }
}

impl Entity for PlayerStat {
    const KIND: EntityKind = EntityKind::PlayerStat;
    fn key(&self) -> i64 {
        self.stat_id
    }
}

impl Entity for Transfer {
    const KIND: EntityKind = EntityKind::Transfer;
    fn key(&self) -> i64 {
        self.trans_id
    }
}

impl PlayerRef for PlayerStat {
    fn player_id(&self) -> Option<i64> {
        self.player_id
    }
}

impl PlayerRef for Transfer {
    fn player_id(&self) -> Option<i64> {
        self.player_id
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One entity collection keyed by primary key. Inserting an existing key
/// replaces the earlier record (last writer wins).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<E> {
    records: BTreeMap<i64, E>,
}

impl<E> Default for Snapshot<E> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<E: Entity> Snapshot<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: E) -> Option<E> {
        self.records.insert(record.key(), record)
    }

    pub fn get(&self, key: i64) -> Option<&E> {
        self.records.get(&key)
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.records.contains_key(&key)
    }

    pub fn remove(&mut self, key: i64) -> Option<E> {
        self.records.remove(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.records.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut E> {
        self.records.values_mut()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&E) -> bool) {
        self.records.retain(|_, r| keep(r));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<E> {
        self.records.into_values().collect()
    }

    pub fn to_table(&self, name: impl Into<String>) -> Result<Table, SyncError> {
        let records: Vec<&E> = self.records.values().collect();
        Table::from_records(name, E::KIND.columns(), &records)
    }

    pub fn from_table(table: &Table) -> Result<Self, SyncError> {
        Ok(table.to_records::<E>()?.into_iter().collect())
    }
}

impl<E: Entity> FromIterator<E> for Snapshot<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialized_keys<T: Serialize>(record: &T) -> Vec<String> {
        let mut keys: Vec<String> = serde_json::to_value(record)
            .unwrap()
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn declared_columns_match_record_fields() {
        let team = Team {
            team_id: 1,
            team_name: None,
            founded_year: None,
            home_city: None,
            manager_name: None,
            stadium_name: None,
            stadium_capacity: None,
            country: None,
        };
        let player = Player {
            player_id: 1,
            team_id: None,
            player_name: None,
            position: None,
            birthdate: None,
            nationality: None,
            contract_until: None,
            market_value: None,
        };
        let m = Match {
            match_id: 1,
            match_date: None,
            home_team_id: None,
            away_team_id: None,
            home_team_score: None,
            away_team_score: None,
            stadium: None,
            referee: None,
        };
        let stat = PlayerStat {
            stat_id: 1,
            player_id: None,
            match_id: None,
            goals: None,
            assists: None,
            yellow_cards: None,
            red_cards: None,
            mins_played: None,
        };
        let transfer = Transfer {
            trans_id: 1,
            player_id: None,
            from_team_id: None,
            to_team_id: None,
            trans_date: None,
            trans_fee: None,
            contract_duration: None,
        };

        assert_eq!(serialized_keys(&team), sorted(EntityKind::Team.columns()));
        assert_eq!(serialized_keys(&player), sorted(EntityKind::Player.columns()));
        assert_eq!(serialized_keys(&m), sorted(EntityKind::Match.columns()));
        assert_eq!(serialized_keys(&stat), sorted(EntityKind::PlayerStat.columns()));
        assert_eq!(serialized_keys(&transfer), sorted(EntityKind::Transfer.columns()));
    }

    #[test]
    fn delete_order_is_children_first() {
        let names: Vec<_> = EntityKind::DELETE_ORDER.iter().map(|k| k.table_name()).collect();
        assert_eq!(
            names,
            ["player_stats", "transfer_history", "matches", "players", "teams"]
        );
        let inserts: Vec<_> = EntityKind::ALL.iter().map(|k| k.table_name()).collect();
        assert_eq!(
            inserts,
            ["teams", "players", "matches", "player_stats", "transfer_history"]
        );
    }

    #[test]
    fn snapshot_last_writer_wins() {
        let a = Transfer {
            trans_id: 3,
            player_id: Some(1),
            from_team_id: None,
            to_team_id: Some(10),
            trans_date: None,
            trans_fee: Some(1.5),
            contract_duration: None,
        };
        let mut b = a.clone();
        b.to_team_id = Some(20);
        let snap: Snapshot<Transfer> = vec![a, b].into_iter().collect();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get(3).unwrap().to_team_id, Some(20));
    }

    #[test]
    fn table_decodes_dates_and_nulls() {
        let mut table = Table::new("players", EntityKind::Player.columns());
        table.rows.push(vec![
            Value::Int(7),
            Value::Null,
            Value::Text("Ana".into()),
            Value::Null,
            Value::Text("1996-04-02".into()),
            Value::Null,
            Value::Null,
            Value::Int(5),
        ]);
        let snap = Snapshot::<Player>::from_table(&table).unwrap();
        let p = snap.get(7).unwrap();
        assert_eq!(p.birthdate, NaiveDate::from_ymd_opt(1996, 4, 2));
        assert_eq!(p.team_id, None);
        assert_eq!(p.market_value, Some(5.0));
    }

    #[test]
    fn decode_error_names_table() {
        let mut table = Table::new("teams", EntityKind::Team.columns());
        table.rows.push(vec![Value::Text("abc".into())]);
        let err = Snapshot::<Team>::from_table(&table).unwrap_err();
        assert!(err.to_string().contains("table 'teams'"));
    }
}
