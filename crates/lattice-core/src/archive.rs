//! Archive collaborator: manifest headers, code entries and persisted unit state.
//!
//! The runtime never reads the on-disk unit format itself. Everything it
//! needs from a unit's storage goes through this trait.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an [`Archive`] implementation.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Writing persisted state failed.
    #[error("failed to persist {what} for {location}: {message}")]
    PersistFailed {
        /// Archive location.
        location: String,
        /// What was being written.
        what: String,
        /// Underlying failure.
        message: String,
    },

    /// Removing the archive's storage failed.
    #[error("failed to purge archive {location}: {message}")]
    PurgeFailed {
        /// Archive location.
        location: String,
        /// Underlying failure.
        message: String,
    },

    /// IO error.
    #[error("archive IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Storage backing one declaration set of a unit.
pub trait Archive: Send + Sync {
    /// Where the archive was installed from.
    fn location(&self) -> &str;

    /// Manifest header lookup.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Raw bytes of a code or resource entry (`"com/foo/Bar.class"`).
    fn read_entry(&self, path: &str) -> Option<Vec<u8>>;

    /// Every entry path in the archive. Directory entries end in `/`.
    fn entry_names(&self) -> Vec<String>;

    /// Filesystem path of a bundled native library, if the archive has one.
    fn native_library(&self, _name: &str) -> Option<PathBuf> {
        None
    }

    /// Record whether the unit should be started when the framework restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if the flag cannot be written.
    fn persist(&self, persistent_start: bool) -> ArchiveResult<()>;

    /// The persisted start flag.
    fn persistent_start(&self) -> bool;

    /// The persisted start level, if one was ever set.
    fn start_level(&self) -> Option<u32>;

    /// Persist a start level.
    ///
    /// # Errors
    ///
    /// Returns an error if the level cannot be written.
    fn set_start_level(&self, level: u32) -> ArchiveResult<()>;

    /// Erase persisted storage after uninstall.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be removed.
    fn purge(&self) -> ArchiveResult<()>;
}
