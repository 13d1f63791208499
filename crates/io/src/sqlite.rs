//! SQLite-backed [`Store`].
//!
//! Tables are created with untyped columns so each cell keeps the storage
//! class it was written with (integer, real, text or null). Every write runs
//! inside a `rusqlite` transaction; returning early drops the transaction,
//! which rolls it back.

use std::path::Path;

use rostersync_recon::model::{Table, Value};
use rostersync_recon::store::{Store, StoreError, WriteMode};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, Transaction};
use tracing::debug;

use crate::error::IoError;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, IoError> {
        let conn = Connection::open(path).map_err(|source| IoError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, IoError> {
        let conn = Connection::open_in_memory().map_err(|source| IoError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Ok(Self { conn })
    }

    /// The underlying connection, for ad-hoc queries and test setup.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Map a SQLite error on `table`: constraint and trigger aborts are
/// rejections, everything else is a backend failure.
fn store_error(table: &str) -> impl Fn(rusqlite::Error) -> StoreError + '_ {
    move |e| match e {
        rusqlite::Error::SqliteFailure(ref code, _) if code.code == ErrorCode::ConstraintViolation => {
            StoreError::Rejected {
                table: table.to_string(),
                message: e.to_string(),
            }
        }
        other => StoreError::Backend(format!("{table}: {other}")),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(n) => SqlValue::Integer(*n),
        Value::Real(x) => SqlValue::Real(*x),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(x) => Value::Real(x),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .map_err(store_error(name))?;
    Ok(count > 0)
}

fn stored_columns(conn: &Connection, name: &str) -> Result<Vec<String>, StoreError> {
    let stmt = conn
        .prepare(&format!("SELECT * FROM {} LIMIT 0", quote_ident(name)))
        .map_err(store_error(name))?;
    Ok(stmt.column_names().iter().map(|c| c.to_string()).collect())
}

fn create_table(tx: &Transaction<'_>, table: &Table, if_not_exists: bool) -> Result<(), StoreError> {
    if table.columns.is_empty() {
        return Err(StoreError::Schema {
            table: table.name.clone(),
            message: "cannot create a table without columns".into(),
        });
    }
    let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(c)).collect();
    let sql = format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        quote_ident(&table.name),
        columns.join(", ")
    );
    tx.execute(&sql, []).map_err(store_error(&table.name))?;
    Ok(())
}

fn ensure_columns(tx: &Transaction<'_>, table: &Table) -> Result<(), StoreError> {
    let stored = stored_columns(tx, &table.name)?;
    if stored != table.columns {
        return Err(StoreError::Schema {
            table: table.name.clone(),
            message: format!(
                "column mismatch: stored [{}], incoming [{}]",
                stored.join(", "),
                table.columns.join(", ")
            ),
        });
    }
    Ok(())
}

fn insert_rows(tx: &Transaction<'_>, table: &Table) -> Result<(), StoreError> {
    let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&table.name),
        columns.join(", "),
        placeholders.join(", ")
    );
    let mut stmt = tx.prepare(&sql).map_err(store_error(&table.name))?;
    for row in &table.rows {
        stmt.execute(params_from_iter(row.iter().map(to_sql)))
            .map_err(store_error(&table.name))?;
    }
    Ok(())
}

/// Create `table` if missing, otherwise require matching columns, then insert.
fn append(tx: &Transaction<'_>, table: &Table) -> Result<(), StoreError> {
    if table_exists(tx, &table.name)? {
        ensure_columns(tx, table)?;
    } else {
        create_table(tx, table, false)?;
    }
    insert_rows(tx, table)
}

impl Store for SqliteStore {
    fn read_table(&self, name: &str) -> Result<Table, StoreError> {
        if !table_exists(&self.conn, name)? {
            return Ok(Table::new(name, Vec::new()));
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name)))
            .map_err(store_error(name))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut table = Table::new(name, columns);
        let mut rows = stmt.query([]).map_err(store_error(name))?;
        while let Some(row) = rows.next().map_err(store_error(name))? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(from_sql(row.get_ref(i).map_err(store_error(name))?));
            }
            table.rows.push(cells);
        }
        Ok(table)
    }

    fn write_table(&mut self, table: &Table, mode: WriteMode) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(store_error(&table.name))?;
        match mode {
            WriteMode::Replace => {
                tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table.name)), [])
                    .map_err(store_error(&table.name))?;
                create_table(&tx, table, false)?;
                insert_rows(&tx, table)?;
            }
            WriteMode::Append => {
                create_table(&tx, table, true)?;
                ensure_columns(&tx, table)?;
                insert_rows(&tx, table)?;
            }
        }
        tx.commit().map_err(store_error(&table.name))?;
        debug!(table = %table.name, rows = table.len(), ?mode, "table written");
        Ok(())
    }

    fn replace_tables(&mut self, delete_order: &[&str], tables: &[Table]) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(store_error("<transaction>"))?;
        for name in delete_order {
            if table_exists(&tx, name)? {
                tx.execute(&format!("DELETE FROM {}", quote_ident(name)), [])
                    .map_err(store_error(name))?;
            }
        }
        for table in tables {
            append(&tx, table)?;
        }
        tx.commit().map_err(store_error("<transaction>"))?;
        debug!(tables = tables.len(), "table set replaced");
        Ok(())
    }
}
