// SQLite persistence, extract loading and run exports

pub mod csv;
pub mod error;
pub mod export;
pub mod sqlite;

pub use error::IoError;
pub use sqlite::SqliteStore;
