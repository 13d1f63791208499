//! Snapshot normalizer: raw CSV extracts to canonical typed records.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::SyncError;
use crate::model::{Entity, EntityKind, FieldSpec, FieldType, Table, Value};

/// Raw header name -> canonical column name.
pub type ColumnMap = BTreeMap<String, String>;

/// The raw header names the upstream extracts use.
pub fn default_column_map(kind: EntityKind) -> ColumnMap {
    kind.fields()
        .iter()
        .map(|f| (f.raw.to_string(), f.name.to_string()))
        .collect()
}

/// Raw header to read `field` from: an override targeting the field wins
/// over the default raw name.
fn raw_header_for<'a>(field: &'a FieldSpec, overrides: Option<&'a ColumnMap>) -> &'a str {
    overrides
        .and_then(|m| m.iter().find(|(_, canonical)| canonical.as_str() == field.name))
        .map(|(raw, _)| raw.as_str())
        .unwrap_or(field.raw)
}

/// Parse CSV text into a canonical table named after the entity.
///
/// Each canonical column is read from its mapped raw header; a header that
/// already carries the canonical name is accepted too. Extra raw columns are
/// ignored.
pub fn normalize_csv(
    kind: EntityKind,
    csv_data: &str,
    overrides: Option<&ColumnMap>,
) -> Result<Table, SyncError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let fields = kind.fields();
    let mut indices = Vec::with_capacity(fields.len());
    for field in fields {
        let raw = raw_header_for(field, overrides);
        let idx = headers
            .iter()
            .position(|h| h == raw)
            .or_else(|| headers.iter().position(|h| h == field.name))
            .ok_or_else(|| SyncError::MissingColumn {
                entity: kind.display_name().into(),
                column: raw.into(),
            })?;
        indices.push(idx);
    }

    let mut table = Table::new(kind.table_name(), kind.columns());
    for (n, record) in reader.records().enumerate() {
        let record = record?;
        let row_number = n + 1;
        let mut row = Vec::with_capacity(fields.len());
        for (field, &idx) in fields.iter().zip(indices.iter()) {
            let raw = record.get(idx).unwrap_or("");
            let invalid = || SyncError::InvalidValue {
                entity: kind.display_name().into(),
                column: field.name.into(),
                row: row_number,
                value: raw.into(),
            };
            let value = parse_cell(field.ty, raw).ok_or_else(invalid)?;
            if value.is_null() && field.name == kind.key_column() {
                return Err(invalid());
            }
            row.push(value);
        }
        table.rows.push(row);
    }

    Ok(table)
}

/// Parse and decode an extract into typed records, preserving extract order
/// (duplicates included; the synchronizer resolves them).
pub fn load_records<E: Entity>(csv_data: &str, overrides: Option<&ColumnMap>) -> Result<Vec<E>, SyncError> {
    normalize_csv(E::KIND, csv_data, overrides)?.to_records()
}

/// `None` when the cell does not parse as `ty`. Blank cells are null.
fn parse_cell(ty: FieldType, raw: &str) -> Option<Value> {
    let s = raw.trim();
    if s.is_empty() {
        return Some(Value::Null);
    }
    match ty {
        FieldType::Text => Some(Value::Text(s.to_string())),
        FieldType::Int => parse_int(s).map(Value::Int),
        FieldType::Real => s.parse::<f64>().ok().filter(|x| x.is_finite()).map(Value::Real),
        FieldType::Date => parse_date(s).map(|d| Value::Text(d.format("%Y-%m-%d").to_string())),
    }
}

/// Integers, tolerating a zero fraction ("12.0") from spreadsheet exports.
fn parse_int(s: &str) -> Option<i64> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    let x: f64 = s.parse().ok()?;
    if x.is_finite() && x.fract() == 0.0 && x.abs() < i64::MAX as f64 {
        Some(x as i64)
    } else {
        None
    }
}

/// `YYYY-MM-DD`, optionally followed by a time part which is dropped.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let date_part = s.split(|c| c == ' ' || c == 'T').next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
