//! Core trait definitions for chainlog.
//!
//! These three traits are the seams between the engine and the outside:
//!
//! - `AuditRecorder`   : what producers hold (the only write entry point)
//! - `AuditStore`      : durable, ordered, write-once persistence
//! - `RollbackHandler` : a producer's compensating action for one resource type
//!
//! Producers receive an `Arc<dyn AuditRecorder>` explicitly; there is no
//! process-wide audit singleton.

use chainlog_contracts::{
    error::ChainlogResult,
    event::AuditEvent,
    query::AuditFilter,
    value::DetailValue,
    AuditEntry,
};

/// Number of entries a default `matching` scan reads per `get_range` call.
const SCAN_BATCH: u64 = 512;

/// The producer interface: append one action to the audit chain.
///
/// A failed call means nothing was committed. The producer decides whether
/// to retry or abort its own user action; the engine never drops an entry
/// silently.
pub trait AuditRecorder: Send + Sync {
    fn record(&self, event: AuditEvent) -> ChainlogResult<AuditEntry>;
}

/// Durable, sequence-ordered storage for committed entries.
///
/// Implementations must treat `append` as write-once: appending at a
/// sequence that is already occupied fails with `SequenceConflict` and
/// leaves the existing entry untouched. A failed append must leave no
/// partial state behind.
pub trait AuditStore: Send + Sync {
    /// Persist `entry` keyed by `entry.sequence`.
    fn append(&self, entry: &AuditEntry) -> ChainlogResult<()>;

    /// Point lookup by sequence.
    fn get(&self, sequence: u64) -> ChainlogResult<Option<AuditEntry>>;

    /// Every stored entry with `start <= sequence <= end`, ascending.
    ///
    /// Missing sequences are simply absent from the result; detecting them
    /// is the verifier's job. Repeating the same call returns the same
    /// entries (plus nothing new inside an already-committed range).
    fn get_range(&self, start: u64, end: u64) -> ChainlogResult<Vec<AuditEntry>>;

    /// The highest-sequence entry, or `None` for an empty chain.
    fn last(&self) -> ChainlogResult<Option<AuditEntry>>;

    /// Mark the entry's compensating action as executed.
    ///
    /// The only permitted post-commit mutation. It touches no hashed field.
    fn set_rollback_executed(&self, sequence: u64) -> ChainlogResult<()>;

    /// Number of stored entries.
    fn count(&self) -> ChainlogResult<u64>;

    /// Every entry satisfying `filter`, ascending by sequence.
    ///
    /// The default implementation scans the whole chain in batches.
    /// Backends with secondary indexes should override it.
    fn matching(&self, filter: &AuditFilter) -> ChainlogResult<Vec<AuditEntry>> {
        let Some(last) = self.last()? else {
            return Ok(Vec::new());
        };

        let mut matches = Vec::new();
        let mut start = 1u64;
        while start <= last.sequence {
            let end = start.saturating_add(SCAN_BATCH - 1).min(last.sequence);
            matches.extend(
                self.get_range(start, end)?
                    .into_iter()
                    .filter(|e| filter.matches(e)),
            );
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        Ok(matches)
    }
}

/// A compensating action registered by the producer that owns a resource type.
///
/// Called with the sequence being rolled back and that entry's `details`,
/// which is everything the producer recorded about the original action.
pub trait RollbackHandler: Send + Sync {
    fn rollback(&self, sequence: u64, details: &DetailValue) -> ChainlogResult<()>;
}

impl<F> RollbackHandler for F
where
    F: Fn(u64, &DetailValue) -> ChainlogResult<()> + Send + Sync,
{
    fn rollback(&self, sequence: u64, details: &DetailValue) -> ChainlogResult<()> {
        self(sequence, details)
    }
}
