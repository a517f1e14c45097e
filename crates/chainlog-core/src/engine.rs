//! The hash-chain engine: sequencing and linking of new entries.
//!
//! `record` is the only mutating operation on the chain. It runs the whole
//! "read head → compute next → append" sequence under one mutex:
//!
//!   lock head → sequence = head + 1 → timestamp → canonicalize → digest
//!             → store.append → advance head
//!
//! The head only moves after the store confirms the write, so a failed
//! append leaves the engine exactly where it was and a retry recomputes the
//! same sequence from the same predecessor.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use chainlog_contracts::{
    entry::{AuditEntry, HashAlgorithm, GENESIS_HASH},
    error::{ChainlogError, ChainlogResult},
    event::AuditEvent,
};

use crate::{
    codec::{canonicalize, digest, CanonicalFields},
    traits::{AuditRecorder, AuditStore},
};

/// Sequence and hash of the last committed entry (0 / genesis when empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    pub sequence: u64,
    pub entry_hash: String,
    /// Commit time of the head entry; `None` before the first entry.
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChainHead {
    fn genesis() -> Self {
        Self {
            sequence: 0,
            entry_hash: GENESIS_HASH.to_string(),
            timestamp: None,
        }
    }

    fn of(entry: Option<&AuditEntry>) -> Self {
        entry
            .map(|e| Self {
                sequence: e.sequence,
                entry_hash: e.entry_hash.clone(),
                timestamp: Some(e.timestamp),
            })
            .unwrap_or_else(Self::genesis)
    }
}

/// The single authoritative append point of an audit chain.
///
/// One engine per store. Share it between producers as
/// `Arc<AuditEngine>` (or `Arc<dyn AuditRecorder>`); `record` may be called
/// from any number of threads.
pub struct AuditEngine {
    store: Arc<dyn AuditStore>,
    head: Mutex<ChainHead>,
    algorithm: HashAlgorithm,
}

impl AuditEngine {
    /// Attach to `store`, resuming after its highest committed entry.
    pub fn open(store: Arc<dyn AuditStore>) -> ChainlogResult<Self> {
        let head = ChainHead::of(store.last()?.as_ref());
        info!(
            sequence = head.sequence,
            head_hash = %head.entry_hash,
            "audit engine attached to store"
        );
        Ok(Self {
            store,
            head: Mutex::new(head),
            algorithm: HashAlgorithm::default(),
        })
    }

    /// The store this engine appends to.
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Current chain head as the engine sees it.
    pub fn head(&self) -> ChainlogResult<ChainHead> {
        Ok(self.lock_head()?.clone())
    }

    /// Stamp, hash, link and durably append one event.
    ///
    /// # Errors
    ///
    /// - `EncodingFailure` if `event.details` has no canonical form (nothing
    ///   is written).
    /// - `PersistenceFailure` if the store write fails (head not advanced).
    /// - `SequenceConflict` if another writer already holds the next
    ///   sequence; the head is resynchronised from the store so a caller
    ///   retry extends the real tail.
    pub fn record(&self, event: AuditEvent) -> ChainlogResult<AuditEntry> {
        let mut head = self.lock_head()?;

        let sequence = head
            .sequence
            .checked_add(1)
            .ok_or_else(|| ChainlogError::PersistenceFailure {
                reason: "sequence space exhausted".to_string(),
            })?;

        let fields = CanonicalFields {
            hash_algorithm: self.algorithm,
            sequence,
            // A wall clock stepping backwards must not reorder the chain.
            timestamp: head.timestamp.map_or_else(Utc::now, |t| t.max(Utc::now())),
            actor: event.actor,
            action_type: event.action_type,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            resource_name: event.resource_name,
            details: event.details,
            ip_address: event.ip_address,
            is_rollbackable: event.is_rollbackable,
            previous_hash: head.entry_hash.clone(),
        };

        let bytes = canonicalize(&fields)?;
        let entry_hash = digest(self.algorithm, &bytes);

        let entry = AuditEntry {
            sequence,
            timestamp: fields.timestamp,
            actor: fields.actor,
            action_type: fields.action_type,
            resource_type: fields.resource_type,
            resource_id: fields.resource_id,
            resource_name: fields.resource_name,
            details: fields.details,
            ip_address: fields.ip_address,
            is_rollbackable: fields.is_rollbackable,
            rollback_executed: false,
            hash_algorithm: fields.hash_algorithm,
            previous_hash: fields.previous_hash,
            entry_hash,
        };

        debug!(
            sequence,
            previous_hash = %entry.previous_hash,
            entry_hash = %entry.entry_hash,
            "appending audit entry"
        );

        match self.store.append(&entry) {
            Ok(()) => {
                *head = ChainHead::of(Some(&entry));
                info!(summary = %entry.summary(), "audit entry committed");
                Ok(entry)
            }
            Err(err @ ChainlogError::SequenceConflict { .. }) => {
                warn!(sequence, error = %err, "sequence already taken, resynchronising head");
                match self.store.last() {
                    Ok(last) => *head = ChainHead::of(last.as_ref()),
                    Err(e) => error!(error = %e, "failed to resynchronise chain head"),
                }
                Err(err)
            }
            Err(err) => {
                error!(sequence, error = %err, "audit append failed; head not advanced");
                Err(err)
            }
        }
    }

    fn lock_head(&self) -> ChainlogResult<std::sync::MutexGuard<'_, ChainHead>> {
        self.head.lock().map_err(|e| ChainlogError::PersistenceFailure {
            reason: format!("chain head lock poisoned: {e}"),
        })
    }
}

impl AuditRecorder for AuditEngine {
    fn record(&self, event: AuditEvent) -> ChainlogResult<AuditEntry> {
        AuditEngine::record(self, event)
    }
}

impl std::fmt::Debug for AuditEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditEngine")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
