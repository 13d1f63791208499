//! `rostersync-recon`: snapshot reconciliation engine for sports datasets.
//!
//! Pure engine crate: receives normalized extracts and a [`Store`], diffs and
//! synchronizes them against persisted state, validates, aggregates, and
//! returns a structured run report. No CLI or SQLite dependencies; the io
//! crate supplies the durable store.

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod diff;
pub mod error;
pub mod history;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod sync;
pub mod validate;

pub use config::PipelineConfig;
pub use dataset::{Dataset, TableSet};
pub use error::SyncError;
pub use model::{EntityKind, Table, Value};
pub use pipeline::{run, run_at, Extracts, RunOutcome};
pub use report::RunReport;
pub use store::{MemoryStore, Store, StoreError, WriteMode};
