//! Chain verification report types.
//!
//! A verification run never raises tamper findings as errors. It returns a
//! `VerificationResult` listing every `ChainIssue` it saw; only an inability
//! to read the store is an `Err`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Inclusive range of sequence numbers to verify.
///
/// `end = None` means "up to the tail captured when verification starts".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl SequenceRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// From `start` to the current tail.
    pub fn from(start: u64) -> Self {
        Self { start, end: None }
    }
}

impl Default for SequenceRange {
    fn default() -> Self {
        Self::from(1)
    }
}

/// A trusted (sequence, hash) anchor from a previous clean verification.
///
/// Passing it back lets a later run resume at `sequence + 1` and still
/// detect rewrites of the anchored entry or truncation behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub sequence: u64,
    pub entry_hash: String,
}

/// One integrity finding at a specific sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIssue {
    pub sequence: u64,
    /// One of `HashMismatch`, `ChainBreak`, `SequenceGap`, `EncodingFailure`.
    pub kind: ErrorKind,
    pub message: String,
}

/// The outcome of verifying a range of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// True when `errors` is empty.
    pub is_valid: bool,

    /// Number of stored entries inspected.
    pub entries_checked: u64,

    /// When the run started (UTC).
    pub verification_time: DateTime<Utc>,

    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,

    /// First and last sequence the run covered, `None` for an empty range.
    pub range: Option<(u64, u64)>,

    /// Every finding, in ascending sequence order.
    pub errors: Vec<ChainIssue>,

    /// Anchor for resuming: the last entry known good. Present only when the
    /// run found no issues and has something to anchor on.
    pub checkpoint: Option<Checkpoint>,
}

impl VerificationResult {
    /// Findings of a single kind.
    pub fn issues_of(&self, kind: ErrorKind) -> impl Iterator<Item = &ChainIssue> {
        self.errors.iter().filter(move |i| i.kind == kind)
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        if self.is_valid {
            format!("chain intact ({} entries checked)", self.entries_checked)
        } else {
            format!(
                "chain compromised ({} entries checked, {} issue(s))",
                self.entries_checked,
                self.errors.len()
            )
        }
    }
}
