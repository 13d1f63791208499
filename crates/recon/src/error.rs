use thiserror::Error;

use crate::store::StoreError;

/// Fatal errors for a reconciliation run.
///
/// Row-level violations (dangling foreign keys, card counts out of range,
/// oversized rosters) are never reported through this type: they are
/// quarantined and recorded in the run report instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (empty path, unknown column override, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// A mapped column is absent from an extract's header row.
    #[error("{entity} extract: missing column '{column}'")]
    MissingColumn { entity: String, column: String },

    /// A cell could not be parsed as its declared type.
    #[error("{entity} extract, row {row}: cannot parse {column} '{value}'")]
    InvalidValue {
        entity: String,
        column: String,
        row: usize,
        value: String,
    },

    /// Malformed CSV (ragged rows, bad quoting).
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A stored row does not decode into its typed record.
    #[error("table '{table}': cannot decode row: {message}")]
    Decode { table: String, message: String },

    /// A typed record does not encode into a table row.
    #[error("cannot encode record: {0}")]
    Encode(String),

    /// Reading a table or writing an error sink failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The transactional replace of a table set failed and was rolled back.
    #[error("transaction failed, persisted state left unchanged: {0}")]
    Transaction(#[source] StoreError),

    /// The audit history sink rejected the append.
    #[error("history append failed, run aborted before any state change: {0}")]
    AuditWrite(#[source] StoreError),
}
