//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: schedulers and wrapper scripts
//! rely on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success (violations found in the data are not errors) |
//! | 1    | General error (unspecified)                         |
//! | 2    | CLI usage error (bad args, reported by clap)        |
//! | 3    | Invalid or unreadable config                        |
//! | 4    | Extract could not be read or normalized             |
//! | 5    | Store unavailable or a store read/write failed      |
//! | 6    | Table-set transaction failed and was rolled back    |
//! | 7    | History append failed; nothing was changed          |

use rostersync_io::IoError;
use rostersync_recon::SyncError;

/// Success: the run committed.
pub const EXIT_SUCCESS: u8 = 0;

/// General error: unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Config file missing, unparseable, or failing validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// An extract file is unreadable, malformed, or missing a mapped column.
pub const EXIT_EXTRACT: u8 = 4;

/// Store could not be opened, read, or written outside a table-set replace.
pub const EXIT_STORE: u8 = 5;

/// Atomic replace of the raw or cleaned tables failed; rolled back.
pub const EXIT_TRANSACTION: u8 = 6;

/// The history sink rejected the append; the run stopped before any change.
pub const EXIT_AUDIT: u8 = 7;

/// Map an engine error to its exit code.
pub fn sync_exit_code(err: &SyncError) -> u8 {
    match err {
        SyncError::ConfigParse(_) | SyncError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        SyncError::MissingColumn { .. } | SyncError::InvalidValue { .. } | SyncError::Csv(_) => EXIT_EXTRACT,
        SyncError::Store(_) | SyncError::Decode { .. } | SyncError::Encode(_) => EXIT_STORE,
        SyncError::Transaction(_) => EXIT_TRANSACTION,
        SyncError::AuditWrite(_) => EXIT_AUDIT,
    }
}

/// Map an io-layer error to its exit code.
pub fn io_exit_code(err: &IoError) -> u8 {
    match err {
        IoError::Read { .. } => EXIT_EXTRACT,
        IoError::Open { .. } => EXIT_STORE,
        IoError::Write { .. } | IoError::Csv(_) | IoError::Json(_) => EXIT_ERROR,
        IoError::Sync(e) => sync_exit_code(e),
    }
}
