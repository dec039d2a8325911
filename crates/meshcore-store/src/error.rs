//! Error types for the store crate.

use thiserror::Error;

/// Errors that can occur when working with the device store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error creating the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No platform application-data directory could be resolved.
    #[error("no application data directory available on this platform")]
    NoDataDir,

    /// No device scope is open (persistence disabled or init incomplete).
    #[error("device store not open")]
    NotOpen,

    /// The database was written by a newer version of this library.
    #[error("database schema v{found} is newer than supported v{supported}")]
    SchemaTooNew {
        /// Version found in the file.
        found: i64,
        /// Newest version this build understands.
        supported: i64,
    },

    /// The database schema is older than this library can migrate from.
    #[error("database schema v{found} is too old to migrate (oldest supported: v{oldest})")]
    SchemaTooOld {
        /// Version found in the file.
        found: i64,
        /// Oldest version a migration path exists for.
        oldest: i64,
    },

    /// The store lock was poisoned (a thread panicked while holding it).
    #[error("store lock was poisoned")]
    LockPoisoned,
}
