//! The durable store capability.
//!
//! The engine only needs three things from storage: read a table, write a
//! table (replace or append), and atomically replace a set of tables.
//! `MemoryStore` backs the engine tests; the SQLite implementation lives in
//! `rostersync-io`.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::model::Table;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the storage backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Incoming rows do not fit the stored table's columns.
    #[error("table '{table}': {message}")]
    Schema { table: String, message: String },

    /// The store refused the write (injected failure, constraint, trigger).
    #[error("table '{table}' rejected write: {message}")]
    Rejected { table: String, message: String },
}

/// How `write_table` treats existing contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Drop prior contents and columns, then write. Used by error sinks and
    /// the final view.
    Replace,
    /// Add rows after existing ones, creating the table if needed. Used by
    /// the history log.
    Append,
}

pub trait Store {
    /// Read all rows of `name`. A table that does not exist reads as empty.
    fn read_table(&self, name: &str) -> Result<Table, StoreError>;

    fn write_table(&mut self, table: &Table, mode: WriteMode) -> Result<(), StoreError>;

    /// In one transaction, delete the contents of `delete_order` tables (in
    /// that order), then insert `tables` (in slice order). On any error no
    /// table is changed.
    fn replace_tables(&mut self, delete_order: &[&str], tables: &[Table]) -> Result<(), StoreError>;
}

/// In-memory store with per-table write failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Table>,
    failing: BTreeSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write touching `table` fail.
    pub fn fail_writes_to(&mut self, table: &str) {
        self.failing.insert(table.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    fn check_writable(&self, table: &str) -> Result<(), StoreError> {
        if self.failing.contains(table) {
            return Err(StoreError::Rejected {
                table: table.to_string(),
                message: "write failure injected".into(),
            });
        }
        Ok(())
    }
}

fn append_rows(tables: &mut BTreeMap<String, Table>, incoming: &Table) -> Result<(), StoreError> {
    match tables.get_mut(&incoming.name) {
        Some(existing) if existing.columns.is_empty() => {
            *existing = incoming.clone();
        }
        Some(existing) => {
            if existing.columns != incoming.columns {
                return Err(StoreError::Schema {
                    table: incoming.name.clone(),
                    message: format!(
                        "column mismatch: stored [{}], incoming [{}]",
                        existing.columns.join(", "),
                        incoming.columns.join(", ")
                    ),
                });
            }
            existing.rows.extend(incoming.rows.iter().cloned());
        }
        None => {
            tables.insert(incoming.name.clone(), incoming.clone());
        }
    }
    Ok(())
}

impl Store for MemoryStore {
    fn read_table(&self, name: &str) -> Result<Table, StoreError> {
        Ok(self
            .tables
            .get(name)
            .cloned()
            .unwrap_or_else(|| Table::new(name, Vec::new())))
    }

    fn write_table(&mut self, table: &Table, mode: WriteMode) -> Result<(), StoreError> {
        self.check_writable(&table.name)?;
        match mode {
            WriteMode::Replace => {
                self.tables.insert(table.name.clone(), table.clone());
                Ok(())
            }
            WriteMode::Append => append_rows(&mut self.tables, table),
        }
    }

    fn replace_tables(&mut self, delete_order: &[&str], tables: &[Table]) -> Result<(), StoreError> {
        // Stage on a copy; swap in only when every step succeeded.
        let mut staged = self.tables.clone();
        for name in delete_order {
            self.check_writable(name)?;
            if let Some(t) = staged.get_mut(*name) {
                t.rows.clear();
            }
        }
        for table in tables {
            self.check_writable(&table.name)?;
            append_rows(&mut staged, table)?;
        }
        self.tables = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn table(name: &str, ids: &[i64]) -> Table {
        let mut t = Table::new(name, vec!["id".into()]);
        for id in ids {
            t.rows.push(vec![Value::Int(*id)]);
        }
        t
    }

    #[test]
    fn missing_table_reads_empty() {
        let store = MemoryStore::new();
        let t = store.read_table("teams").unwrap();
        assert!(t.is_empty());
        assert!(t.columns.is_empty());
    }

    #[test]
    fn append_then_replace() {
        let mut store = MemoryStore::new();
        store.write_table(&table("log", &[1]), WriteMode::Append).unwrap();
        store.write_table(&table("log", &[2]), WriteMode::Append).unwrap();
        assert_eq!(store.read_table("log").unwrap().len(), 2);

        store.write_table(&table("log", &[9]), WriteMode::Replace).unwrap();
        let t = store.read_table("log").unwrap();
        assert_eq!(t.rows, vec![vec![Value::Int(9)]]);
    }

    #[test]
    fn append_rejects_column_mismatch() {
        let mut store = MemoryStore::new();
        store.write_table(&table("log", &[1]), WriteMode::Append).unwrap();
        let other = Table::new("log", vec!["other".into()]);
        let err = store.write_table(&other, WriteMode::Append).unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
    }

    #[test]
    fn replace_tables_is_all_or_nothing() {
        let mut store = MemoryStore::new();
        store
            .replace_tables(&["b", "a"], &[table("a", &[1]), table("b", &[1])])
            .unwrap();

        store.fail_writes_to("b");
        let err = store.replace_tables(&["b", "a"], &[table("a", &[2]), table("b", &[2])]);
        assert!(err.is_err());

        // Neither table moved to the new contents.
        assert_eq!(store.read_table("a").unwrap().rows, vec![vec![Value::Int(1)]]);
        assert_eq!(store.read_table("b").unwrap().rows, vec![vec![Value::Int(1)]]);

        store.clear_failures();
        store
            .replace_tables(&["b", "a"], &[table("a", &[2]), table("b", &[3])])
            .unwrap();
        assert_eq!(store.read_table("b").unwrap().rows, vec![vec![Value::Int(3)]]);
    }
}
