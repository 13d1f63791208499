//! Append-only audit log of superseded records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::diff::DiffOutcome;
use crate::error::SyncError;
use crate::model::{Entity, EntityKind, Table};
use crate::store::{Store, WriteMode};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Updated,
    Deleted,
}

/// A pre-change record, tagged with why it left the live table and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry<E> {
    #[serde(flatten)]
    pub record: E,
    pub operation: Operation,
    pub timestamp: String,
}

/// `players_history` for players, and so on.
pub fn history_table_name(kind: EntityKind) -> String {
    format!("{}_history", kind.table_name())
}

pub fn history_columns(kind: EntityKind) -> Vec<String> {
    let mut columns = kind.columns();
    columns.push("operation".into());
    columns.push("timestamp".into());
    columns
}

/// Deleted entries first, then updated, each in diff order, all sharing the
/// single run timestamp.
pub fn build_entries<E: Entity>(diff: &DiffOutcome<E>, run_at: NaiveDateTime) -> Vec<HistoryEntry<E>> {
    let timestamp = run_at.format(TIMESTAMP_FORMAT).to_string();
    let entry = |record: &E, operation: Operation| HistoryEntry {
        record: record.clone(),
        operation,
        timestamp: timestamp.clone(),
    };
    diff.deleted
        .iter()
        .map(|r| entry(r, Operation::Deleted))
        .chain(diff.updated.iter().map(|r| entry(r, Operation::Updated)))
        .collect()
}

/// Append the diff's superseded records to the entity's history sink.
///
/// A failed append is fatal ([`SyncError::AuditWrite`]): the caller must not
/// go on to change persisted state without an audit trail.
pub fn record_history<E: Entity, S: Store + ?Sized>(
    store: &mut S,
    diff: &DiffOutcome<E>,
    run_at: NaiveDateTime,
) -> Result<usize, SyncError> {
    let entries = build_entries(diff, run_at);
    let table = Table::from_records(history_table_name(E::KIND), history_columns(E::KIND), &entries)?;

    store.write_table(&table, WriteMode::Append).map_err(|e| {
        error!(table = %table.name, error = %e, "history append failed");
        SyncError::AuditWrite(e)
    })?;

    debug!(
        table = %table.name,
        deleted = diff.deleted.len(),
        updated = diff.updated.len(),
        "history appended"
    );
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_snapshots;
    use crate::model::{Player, Snapshot};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn player(id: i64, team: i64) -> Player {
        Player {
            player_id: id,
            team_id: Some(team),
            player_name: Some(format!("P{id}")),
            position: Some("Defender".into()),
            birthdate: NaiveDate::from_ymd_opt(1999, 5, 5),
            nationality: Some("Italy".into()),
            contract_until: Some("2028".into()),
            market_value: Some(250_000.0),
        }
    }

    fn run_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn entries_carry_operation_and_shared_timestamp() {
        let persisted: Snapshot<Player> = vec![player(1, 10), player(2, 10)].into_iter().collect();
        let incoming: Snapshot<Player> = vec![player(2, 11)].into_iter().collect();
        let diff = diff_snapshots(&persisted, &incoming).unwrap();

        let entries = build_entries(&diff, run_at());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation, Operation::Deleted);
        assert_eq!(entries[0].record.player_id, 1);
        assert_eq!(entries[1].operation, Operation::Updated);
        assert_eq!(entries[1].record.team_id, Some(10));
        assert!(entries.iter().all(|e| e.timestamp == "2026-03-01 09:30:00"));
    }

    #[test]
    fn appends_never_rewrite_earlier_entries() {
        let mut store = MemoryStore::new();
        let persisted: Snapshot<Player> = vec![player(1, 10)].into_iter().collect();
        let incoming: Snapshot<Player> = Snapshot::new();
        let diff = diff_snapshots(&persisted, &incoming).unwrap();

        assert_eq!(record_history(&mut store, &diff, run_at()).unwrap(), 1);
        assert_eq!(record_history(&mut store, &diff, run_at()).unwrap(), 1);

        let table = store.read_table("players_history").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns.last().map(String::as_str), Some("timestamp"));

        let decoded: Vec<HistoryEntry<Player>> = table.to_records().unwrap();
        assert!(decoded.iter().all(|e| e.operation == Operation::Deleted));
    }

    #[test]
    fn sink_failure_is_fatal() {
        let mut store = MemoryStore::new();
        store.fail_writes_to("players_history");
        let persisted: Snapshot<Player> = vec![player(1, 10)].into_iter().collect();
        let diff = diff_snapshots(&persisted, &Snapshot::new()).unwrap();

        let err = record_history(&mut store, &diff, run_at()).unwrap_err();
        assert!(matches!(err, SyncError::AuditWrite(_)));
    }
}
