use serde::Serialize;

use crate::error::SyncError;
use crate::model::{Entity, Snapshot};

/// Per-key change status of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Unchanged,
    Updated,
    Deleted,
}

/// Result of comparing a persisted snapshot to an incoming one.
///
/// `deleted` and `updated` hold the persisted (pre-change) records, in key
/// order. Every persisted key lands in exactly one of `deleted`, `updated`,
/// `unchanged`; incoming keys with no persisted record land in `inserted`.
#[derive(Debug, Clone)]
pub struct DiffOutcome<E> {
    pub deleted: Vec<E>,
    pub updated: Vec<E>,
    pub unchanged: Vec<i64>,
    pub inserted: Vec<i64>,
}

impl<E: Entity> DiffOutcome<E> {
    pub fn is_clean(&self) -> bool {
        self.deleted.is_empty() && self.updated.is_empty()
    }
}

/// Field-wise comparison over every serialized non-key field.
///
/// A null on either side counts as a difference, including null vs null:
/// the comparison is by value and null carries none.
pub fn records_differ<E: Entity>(persisted: &E, incoming: &E) -> Result<bool, SyncError> {
    let left = serde_json::to_value(persisted).map_err(|e| SyncError::Encode(e.to_string()))?;
    let right = serde_json::to_value(incoming).map_err(|e| SyncError::Encode(e.to_string()))?;
    let (Some(left), Some(right)) = (left.as_object(), right.as_object()) else {
        return Err(SyncError::Encode("record did not serialize to a map".into()));
    };

    let key = E::KIND.key_column();
    for (column, lv) in left {
        if column == key {
            continue;
        }
        let rv = right.get(column).unwrap_or(&serde_json::Value::Null);
        if lv.is_null() || rv.is_null() || lv != rv {
            return Ok(true);
        }
    }
    // Fields present only on the incoming side.
    Ok(right.keys().any(|c| c != key && !left.contains_key(c)))
}

/// Classify one persisted record. Absence from the incoming snapshot is
/// checked first, so a deleted key is never also reported as updated.
pub fn classify<E: Entity>(persisted: &E, incoming: Option<&E>) -> Result<ChangeKind, SyncError> {
    match incoming {
        None => Ok(ChangeKind::Deleted),
        Some(inc) if records_differ(persisted, inc)? => Ok(ChangeKind::Updated),
        Some(_) => Ok(ChangeKind::Unchanged),
    }
}

pub fn diff_snapshots<E: Entity>(
    persisted: &Snapshot<E>,
    incoming: &Snapshot<E>,
) -> Result<DiffOutcome<E>, SyncError> {
    let mut outcome = DiffOutcome {
        deleted: Vec::new(),
        updated: Vec::new(),
        unchanged: Vec::new(),
        inserted: Vec::new(),
    };

    for record in persisted.iter() {
        match classify(record, incoming.get(record.key()))? {
            ChangeKind::Deleted => outcome.deleted.push(record.clone()),
            ChangeKind::Updated => outcome.updated.push(record.clone()),
            ChangeKind::Unchanged => outcome.unchanged.push(record.key()),
        }
    }

    outcome.inserted = incoming.keys().filter(|k| !persisted.contains_key(*k)).collect();

    Ok(outcome)
}
