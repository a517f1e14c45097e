//! In-memory implementation of `AuditStore`.
//!
//! `InMemoryAuditStore` keeps every committed entry in a `BTreeMap` keyed by
//! sequence, plus the secondary indexes the query façade filters on
//! (`action_type`, `resource_type`, `timestamp`). All state sits behind one
//! `Mutex`, so the store can be shared as `Arc<dyn AuditStore>` between the
//! engine, the verifier and any number of readers.
//!
//! The same `IndexedEntries` structure backs the file store's read cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use chainlog_contracts::{
    entry::{ActionType, AuditEntry},
    error::{ChainlogError, ChainlogResult},
    query::AuditFilter,
};
use chainlog_core::traits::AuditStore;

// ── Indexed entry set ─────────────────────────────────────────────────────────

/// Committed entries plus their secondary indexes.
#[derive(Debug, Default)]
pub(crate) struct IndexedEntries {
    pub(crate) entries: BTreeMap<u64, AuditEntry>,
    by_action: HashMap<ActionType, BTreeSet<u64>>,
    by_resource_type: HashMap<String, BTreeSet<u64>>,
    by_timestamp: BTreeMap<DateTime<Utc>, BTreeSet<u64>>,
}

impl IndexedEntries {
    /// Insert a new entry, refusing an occupied sequence.
    pub(crate) fn insert(&mut self, entry: AuditEntry) -> ChainlogResult<()> {
        if self.entries.contains_key(&entry.sequence) {
            return Err(ChainlogError::SequenceConflict {
                sequence: entry.sequence,
            });
        }

        let sequence = entry.sequence;
        self.by_action
            .entry(entry.action_type)
            .or_default()
            .insert(sequence);
        self.by_resource_type
            .entry(entry.resource_type.clone())
            .or_default()
            .insert(sequence);
        self.by_timestamp
            .entry(entry.timestamp)
            .or_default()
            .insert(sequence);
        self.entries.insert(sequence, entry);
        Ok(())
    }

    pub(crate) fn contains(&self, sequence: u64) -> bool {
        self.entries.contains_key(&sequence)
    }

    pub(crate) fn get(&self, sequence: u64) -> Option<AuditEntry> {
        self.entries.get(&sequence).cloned()
    }

    pub(crate) fn range(&self, start: u64, end: u64) -> Vec<AuditEntry> {
        if start > end {
            return Vec::new();
        }
        self.entries
            .range(start..=end)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub(crate) fn last(&self) -> Option<AuditEntry> {
        self.entries.values().next_back().cloned()
    }

    pub(crate) fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Set the rollback annotation. Returns `false` if it was already set.
    pub(crate) fn mark_rollback_executed(&mut self, sequence: u64) -> ChainlogResult<bool> {
        let entry = self
            .entries
            .get_mut(&sequence)
            .ok_or(ChainlogError::EntryNotFound { sequence })?;
        let changed = !entry.rollback_executed;
        entry.rollback_executed = true;
        Ok(changed)
    }

    /// Every entry satisfying `filter`, ascending by sequence.
    ///
    /// Indexed criteria narrow the candidate set; the remaining criteria
    /// (`actor`, `resource_id`) are checked entry by entry.
    pub(crate) fn matching(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let mut candidates: Option<BTreeSet<u64>> = None;

        if let Some(action) = filter.action_type {
            let hits = self.by_action.get(&action).cloned().unwrap_or_default();
            candidates = Some(intersect(candidates, hits));
        }
        if let Some(resource_type) = &filter.resource_type {
            let hits = self
                .by_resource_type
                .get(resource_type)
                .cloned()
                .unwrap_or_default();
            candidates = Some(intersect(candidates, hits));
        }
        if filter.start_date.is_some() || filter.end_date.is_some() {
            candidates = Some(intersect(candidates, self.in_time_window(filter)));
        }

        let matches: Vec<AuditEntry> = match candidates {
            Some(set) => set
                .iter()
                .filter_map(|seq| self.entries.get(seq))
                .filter(|e| filter.matches(e))
                .cloned()
                .collect(),
            None => self
                .entries
                .values()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect(),
        };

        debug!(matched = matches.len(), "index lookup served");
        matches
    }

    fn in_time_window(&self, filter: &AuditFilter) -> BTreeSet<u64> {
        let lower = filter.start_date.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let upper = filter.end_date.unwrap_or(DateTime::<Utc>::MAX_UTC);
        if lower > upper {
            return BTreeSet::new();
        }
        self.by_timestamp
            .range(lower..=upper)
            .flat_map(|(_, seqs)| seqs.iter().copied())
            .collect()
    }
}

fn intersect(current: Option<BTreeSet<u64>>, hits: BTreeSet<u64>) -> BTreeSet<u64> {
    match current {
        Some(current) => current.intersection(&hits).copied().collect(),
        None => hits,
    }
}

// ── Public store ──────────────────────────────────────────────────────────────

/// A volatile, indexed `AuditStore`.
///
/// Suitable for tests, demos and deployments that replicate the log
/// elsewhere. Everything is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    pub(crate) state: Mutex<IndexedEntries>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load previously exported entries verbatim, e.g. a JSON export being
    /// audited offline.
    ///
    /// Nothing is re-hashed or re-linked: the point is to hand the entries
    /// exactly as found to the verifier. Gaps are kept; a repeated sequence
    /// fails with `SequenceConflict`.
    pub fn from_entries(entries: impl IntoIterator<Item = AuditEntry>) -> ChainlogResult<Self> {
        let mut state = IndexedEntries::default();
        for entry in entries {
            state.insert(entry)?;
        }
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// A copy of every stored entry, ascending by sequence.
    pub fn snapshot(&self) -> ChainlogResult<Vec<AuditEntry>> {
        Ok(self.lock()?.entries.values().cloned().collect())
    }

    fn lock(&self) -> ChainlogResult<MutexGuard<'_, IndexedEntries>> {
        self.state.lock().map_err(|e| ChainlogError::PersistenceFailure {
            reason: format!("audit store lock poisoned: {e}"),
        })
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, entry: &AuditEntry) -> ChainlogResult<()> {
        self.lock()?.insert(entry.clone())
    }

    fn get(&self, sequence: u64) -> ChainlogResult<Option<AuditEntry>> {
        Ok(self.lock()?.get(sequence))
    }

    fn get_range(&self, start: u64, end: u64) -> ChainlogResult<Vec<AuditEntry>> {
        Ok(self.lock()?.range(start, end))
    }

    fn last(&self) -> ChainlogResult<Option<AuditEntry>> {
        Ok(self.lock()?.last())
    }

    fn set_rollback_executed(&self, sequence: u64) -> ChainlogResult<()> {
        self.lock()?.mark_rollback_executed(sequence).map(|_| ())
    }

    fn count(&self) -> ChainlogResult<u64> {
        Ok(self.lock()?.len())
    }

    fn matching(&self, filter: &AuditFilter) -> ChainlogResult<Vec<AuditEntry>> {
        Ok(self.lock()?.matching(filter))
    }
}
