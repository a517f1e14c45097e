//! Chain verifier for the chainlog audit log.
//!
//! `ChainVerifier` streams a range of the chain in ascending sequence order
//! and checks, for every entry:
//!
//! 1. **Link**: the stored `previous_hash` equals the stored `entry_hash` of
//!    the entry before it (or the genesis constant). Mismatch is a
//!    `ChainBreak`.
//! 2. **Content**: recomputing the digest over the entry's own stored fields
//!    reproduces its `entry_hash`. Mismatch is a `HashMismatch`.
//! 3. **Contiguity**: no sequence is skipped. A hole is a `SequenceGap`
//!    reported at the first missing sequence.
//!
//! The content check hashes the entry's *stored* `previous_hash`, not the
//! expected one, so it only ever reflects that entry's own fields. A broken
//! link is reported once as `ChainBreak` and not repeated as a
//! `HashMismatch`: deleting entry k yields `SequenceGap` at k and
//! `ChainBreak` at k+1, with no `HashMismatch` at k+1.
//!
//! The expected predecessor hash always advances to the *stored* hash, so a
//! single edited entry yields exactly one `HashMismatch` and leaves its
//! untouched successors clean.
//!
//! Every finding is collected before returning. The only `Err` a run can
//! produce is a failure to read the store.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use chainlog_contracts::{
    entry::{AuditEntry, GENESIS_HASH},
    error::{ChainlogError, ChainlogResult, ErrorKind},
    verify::{ChainIssue, Checkpoint, SequenceRange, VerificationResult},
};
use chainlog_core::{codec::recompute_entry_hash, traits::AuditStore};

/// Entries fetched per `get_range` call unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: u64 = 1000;

/// Read-only integrity checker over an `AuditStore`.
///
/// Needs no coordination with the engine: every run bounds itself to the
/// tail observed when it starts, so concurrent appends are simply not part
/// of that run.
#[derive(Clone)]
pub struct ChainVerifier {
    store: Arc<dyn AuditStore>,
    batch_size: u64,
}

impl ChainVerifier {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Fetch `batch_size` entries per store read (minimum 1).
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Verify the whole chain.
    pub fn verify_chain(&self) -> ChainlogResult<VerificationResult> {
        self.verify(None)
    }

    /// Verify `range` (default: from sequence 1 to the current tail).
    ///
    /// A range starting after 1 is anchored on the stored hash of the entry
    /// just before it; if that entry is missing, the gap is reported and the
    /// first entry's link is taken on trust.
    ///
    /// # Errors
    ///
    /// Only store read failures. Tampering is reported in the result.
    pub fn verify(&self, range: Option<SequenceRange>) -> ChainlogResult<VerificationResult> {
        let range = range.unwrap_or_default();
        let run = Run::start(self.tail()?);
        let start = range.start.max(1);
        let end = range.end.map_or(run.tail, |end| end.min(run.tail));

        let mut issues = Vec::new();
        let anchor = if start == 1 {
            Some(Checkpoint {
                sequence: 0,
                entry_hash: GENESIS_HASH.to_string(),
            })
        } else if start <= end {
            match self.store.get(start - 1)? {
                Some(prev) => Some(Checkpoint {
                    sequence: prev.sequence,
                    entry_hash: prev.entry_hash,
                }),
                None => {
                    issues.push(issue(
                        start - 1,
                        ErrorKind::SequenceGap,
                        format!("entry {} preceding the verified range is missing", start - 1),
                    ));
                    None
                }
            }
        } else {
            None
        };

        let mut scan = self.scan(start, end, anchor, issues)?;
        // A run that anchored on genesis and saw nothing has nothing to offer.
        scan.last_good = scan.last_good.take().filter(|c| c.sequence > 0);
        Ok(run.finish(start, end, scan))
    }

    /// Resume from a checkpoint returned by an earlier clean run.
    ///
    /// The checkpointed entry itself is re-checked: if it is gone (or the
    /// log now ends before it) that is a `SequenceGap`; if its stored hash
    /// changed, a `HashMismatch`. Scanning then continues at
    /// `checkpoint.sequence + 1` up to `end` (default: current tail),
    /// linked to the checkpointed hash.
    ///
    /// # Errors
    ///
    /// Only store read failures.
    pub fn verify_from(
        &self,
        checkpoint: &Checkpoint,
        end: Option<u64>,
    ) -> ChainlogResult<VerificationResult> {
        let run = Run::start(self.tail()?);
        let mut issues = Vec::new();

        if checkpoint.sequence > run.tail {
            warn!(
                checkpoint = checkpoint.sequence,
                tail = run.tail,
                "audit log ends before the checkpoint"
            );
            issues.push(issue(
                checkpoint.sequence,
                ErrorKind::SequenceGap,
                format!(
                    "log truncated: checkpointed entry {} is beyond the current tail {}",
                    checkpoint.sequence, run.tail
                ),
            ));
            let start = checkpoint.sequence.saturating_add(1);
            return Ok(run.finish(
                start,
                start.saturating_sub(1),
                Scan {
                    checked: 0,
                    issues,
                    last_good: None,
                },
            ));
        }

        if checkpoint.sequence > 0 {
            match self.store.get(checkpoint.sequence)? {
                None => issues.push(issue(
                    checkpoint.sequence,
                    ErrorKind::SequenceGap,
                    format!("checkpointed entry {} is missing", checkpoint.sequence),
                )),
                Some(anchor) if anchor.entry_hash != checkpoint.entry_hash => issues.push(issue(
                    checkpoint.sequence,
                    ErrorKind::HashMismatch,
                    format!(
                        "checkpointed entry {} now carries hash {} instead of {}",
                        checkpoint.sequence, anchor.entry_hash, checkpoint.entry_hash
                    ),
                )),
                Some(_) => {}
            }
        }

        let start = checkpoint.sequence.saturating_add(1);
        let end = end.map_or(run.tail, |end| end.min(run.tail));
        let scan = self.scan(start, end, Some(checkpoint.clone()), issues)?;
        Ok(run.finish(start, end, scan))
    }

    fn tail(&self) -> ChainlogResult<u64> {
        Ok(self.store.last()?.map_or(0, |e| e.sequence))
    }

    /// Check `start..=end` in batches, linking the first entry to `anchor`.
    fn scan(
        &self,
        start: u64,
        end: u64,
        anchor: Option<Checkpoint>,
        mut issues: Vec<ChainIssue>,
    ) -> ChainlogResult<Scan> {
        let mut checked = 0u64;
        let mut prev_sequence = start.saturating_sub(1);
        let mut expected: Option<String> = anchor.as_ref().map(|a| a.entry_hash.clone());
        let mut last_good = anchor;

        let mut cursor = start;
        while cursor <= end {
            let batch_end = cursor.saturating_add(self.batch_size - 1).min(end);
            let batch = self.store.get_range(cursor, batch_end)?;
            debug!(from = cursor, to = batch_end, fetched = batch.len(), "verifying batch");

            for entry in batch {
                if entry.sequence < cursor || entry.sequence > batch_end {
                    return Err(ChainlogError::PersistenceFailure {
                        reason: format!(
                            "store returned entry {} for range {cursor}..={batch_end}",
                            entry.sequence
                        ),
                    });
                }
                if entry.sequence != prev_sequence + 1 {
                    issues.push(gap(prev_sequence + 1, entry.sequence - 1));
                }

                check_entry(&entry, expected.as_deref(), &mut issues);

                expected = Some(entry.entry_hash.clone());
                prev_sequence = entry.sequence;
                checked += 1;
                last_good = Some(Checkpoint {
                    sequence: entry.sequence,
                    entry_hash: entry.entry_hash,
                });
            }

            if batch_end == end {
                break;
            }
            cursor = batch_end + 1;
        }

        if start <= end && prev_sequence < end {
            issues.push(gap(prev_sequence + 1, end));
        }

        Ok(Scan {
            checked,
            issues,
            last_good,
        })
    }
}

impl std::fmt::Debug for ChainVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainVerifier")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

struct Scan {
    checked: u64,
    issues: Vec<ChainIssue>,
    last_good: Option<Checkpoint>,
}

/// Timing and tail snapshot of one verification run.
struct Run {
    started_at: chrono::DateTime<Utc>,
    clock: Instant,
    tail: u64,
}

impl Run {
    fn start(tail: u64) -> Self {
        Self {
            started_at: Utc::now(),
            clock: Instant::now(),
            tail,
        }
    }

    fn finish(self, start: u64, end: u64, scan: Scan) -> VerificationResult {
        let is_valid = scan.issues.is_empty();
        let result = VerificationResult {
            is_valid,
            entries_checked: scan.checked,
            verification_time: self.started_at,
            duration_ms: u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            range: (start <= end).then_some((start, end)),
            errors: scan.issues,
            checkpoint: if is_valid { scan.last_good } else { None },
        };

        if is_valid {
            info!(
                entries_checked = result.entries_checked,
                duration_ms = result.duration_ms,
                "audit chain verified intact"
            );
        } else {
            warn!(
                entries_checked = result.entries_checked,
                issues = result.errors.len(),
                "audit chain verification found tampering"
            );
        }
        result
    }
}

fn check_entry(entry: &AuditEntry, expected_previous: Option<&str>, issues: &mut Vec<ChainIssue>) {
    if let Some(expected) = expected_previous {
        if entry.previous_hash != expected {
            warn!(sequence = entry.sequence, "previous_hash does not link to predecessor");
            issues.push(issue(
                entry.sequence,
                ErrorKind::ChainBreak,
                format!(
                    "previous_hash {} does not match the preceding entry hash {expected}",
                    entry.previous_hash
                ),
            ));
        }
    }

    match recompute_entry_hash(entry) {
        Ok(recomputed) if recomputed == entry.entry_hash => {}
        Ok(recomputed) => {
            warn!(sequence = entry.sequence, "stored entry_hash does not match its content");
            issues.push(issue(
                entry.sequence,
                ErrorKind::HashMismatch,
                format!(
                    "stored entry_hash {} but content hashes to {recomputed}",
                    entry.entry_hash
                ),
            ));
        }
        Err(err) => {
            warn!(sequence = entry.sequence, error = %err, "stored entry cannot be re-encoded");
            issues.push(issue(entry.sequence, err.kind(), err.to_string()));
        }
    }
}

fn gap(first_missing: u64, last_missing: u64) -> ChainIssue {
    warn!(first_missing, last_missing, "sequence gap in audit chain");
    let message = if first_missing == last_missing {
        format!("entry {first_missing} is missing")
    } else {
        format!("entries {first_missing}..={last_missing} are missing")
    };
    issue(first_missing, ErrorKind::SequenceGap, message)
}

fn issue(sequence: u64, kind: ErrorKind, message: String) -> ChainIssue {
    ChainIssue {
        sequence,
        kind,
        message,
    }
}
