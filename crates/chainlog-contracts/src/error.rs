//! Error types for the chainlog audit engine.
//!
//! Every fallible operation on the write path, the query path and the
//! rollback path returns `ChainlogResult<T>`. Verification-time tamper
//! findings are NOT errors: they are collected as `ChainIssue`s in a
//! `VerificationResult` so one corrupted entry never hides the rest of the
//! report. `ErrorKind` is the shared taxonomy both use.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification shared by runtime errors and verification findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// An action type outside the fixed enumeration.
    InvalidAction,
    /// A value could not be brought into (or read back from) canonical form.
    EncodingFailure,
    /// The store could not durably read or write.
    PersistenceFailure,
    /// An entry already exists at the sequence being appended.
    SequenceConflict,
    /// A stored `entry_hash` does not match the recomputed digest.
    HashMismatch,
    /// A stored `previous_hash` does not match its predecessor's `entry_hash`.
    ChainBreak,
    /// One or more sequence numbers are missing.
    SequenceGap,
    /// A compensating action could not be dispatched or failed.
    RollbackFailed,
    /// A requested entry does not exist.
    NotFound,
    /// Invalid or unreadable configuration.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidAction => "InvalidAction",
            ErrorKind::EncodingFailure => "EncodingFailure",
            ErrorKind::PersistenceFailure => "PersistenceFailure",
            ErrorKind::SequenceConflict => "SequenceConflict",
            ErrorKind::HashMismatch => "HashMismatch",
            ErrorKind::ChainBreak => "ChainBreak",
            ErrorKind::SequenceGap => "SequenceGap",
            ErrorKind::RollbackFailed => "RollbackFailed",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Config => "Config",
        };
        f.write_str(name)
    }
}

/// The unified error type for chainlog.
#[derive(Debug, Error)]
pub enum ChainlogError {
    /// The action type is not one of the fixed enumeration.
    #[error("invalid action type '{value}'")]
    InvalidAction { value: String },

    /// The entry (usually its `details` payload) has no canonical form.
    #[error("canonical encoding failed: {reason}")]
    EncodingFailure { reason: String },

    /// The store failed to persist or read entries.
    ///
    /// On `record` this is surfaced to the producer; the chain head is not
    /// advanced, so a retry recomputes from the same prior state.
    #[error("persistence failure: {reason}")]
    PersistenceFailure { reason: String },

    /// Another writer already committed an entry at `sequence`.
    #[error("sequence conflict: an entry is already committed at sequence {sequence}")]
    SequenceConflict { sequence: u64 },

    /// No entry is stored at `sequence`.
    #[error("audit entry {sequence} not found")]
    EntryNotFound { sequence: u64 },

    /// The rollback of the entry at `sequence` could not be completed.
    ///
    /// The entry stays eligible for a later retry.
    #[error("rollback of entry {sequence} failed: {reason}")]
    RollbackFailed { sequence: u64, reason: String },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

impl ChainlogError {
    /// Map this error onto the shared `ErrorKind` taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainlogError::InvalidAction { .. } => ErrorKind::InvalidAction,
            ChainlogError::EncodingFailure { .. } => ErrorKind::EncodingFailure,
            ChainlogError::PersistenceFailure { .. } => ErrorKind::PersistenceFailure,
            ChainlogError::SequenceConflict { .. } => ErrorKind::SequenceConflict,
            ChainlogError::EntryNotFound { .. } => ErrorKind::NotFound,
            ChainlogError::RollbackFailed { .. } => ErrorKind::RollbackFailed,
            ChainlogError::ConfigError { .. } => ErrorKind::Config,
        }
    }
}

/// Convenience alias used throughout the chainlog crates.
pub type ChainlogResult<T> = Result<T, ChainlogError>;
