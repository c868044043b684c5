//! Error types for the goldmerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! Merge conflicts and "no diffs" are *not* errors: they are result states
//! of an apply (see [`crate::aggregator::ApplyOutcome`]).

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Test report errors
// ---------------------------------------------------------------------------

/// Errors from loading a test-result report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report file does not exist (the test command did not produce one).
    #[error("test report not found: {0}")]
    NotFound(String),

    /// The report is not valid JSON or does not match the report schema.
    #[error("failed to parse test report '{path}': {detail}")]
    ParseError { path: String, detail: String },

    /// Generic I/O wrapper.
    #[error("test report I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// File store errors
// ---------------------------------------------------------------------------

/// Errors from reading or writing test-data files.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading a file failed for a reason other than it being absent.
    #[error("failed to read '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a file failed. Files written earlier in the same transaction
    /// have been restored.
    #[error("failed to write '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A rollback after a failed write could not restore every file.
    #[error("rollback incomplete after failed write to '{path}'; not restored: {unrestored:?}")]
    RollbackIncomplete { path: String, unrestored: Vec<String> },
}

// ---------------------------------------------------------------------------
// Undo journal errors
// ---------------------------------------------------------------------------

/// Errors from the undo journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// There is no recorded apply to undo.
    #[error("nothing to undo")]
    Empty,

    /// A file was edited after the apply that is being undone.
    #[error("'{0}' was modified after it was applied; use --force to overwrite")]
    ModifiedSinceApply(String),

    /// The journal file is corrupt.
    #[error("undo journal parse error: {0}")]
    ParseError(String),

    /// Restoring a file failed.
    #[error("undo journal store error: {0}")]
    StoreError(#[from] StoreError),

    /// Generic I/O wrapper.
    #[error("undo journal I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
