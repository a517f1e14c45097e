//! Rollback coordination.
//!
//! Producers register a compensating action per resource type in a
//! `RollbackRegistry`. `RollbackCoordinator::rollback` looks the entry up,
//! checks eligibility, dispatches to the handler and, only on success,
//! marks the entry's `rollback_executed` annotation. A failing handler
//! leaves the entry untouched and eligible for retry.
//!
//! The annotation lives outside the hash chain. When built with
//! `with_chained_rollbacks`, the coordinator additionally records a chained
//! `RESTORE` entry referencing the rolled-back sequence. Once the handler has
//! run the rollback counts as done: a `RESTORE` entry that fails to append is
//! reported in the outcome and can be written later with `record_restore`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use chainlog_contracts::{
    entry::{ActionType, Actor, AuditEntry},
    error::{ChainlogError, ChainlogResult},
    event::AuditEvent,
    query::AuditFilter,
    value::DetailValue,
};

use crate::traits::{AuditRecorder, AuditStore, RollbackHandler};

/// Compensating actions keyed by `resource_type`.
#[derive(Default, Clone)]
pub struct RollbackRegistry {
    handlers: HashMap<String, Arc<dyn RollbackHandler>>,
}

impl RollbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `resource_type`, replacing any previous one.
    pub fn register(
        &mut self,
        resource_type: impl Into<String>,
        handler: impl RollbackHandler + 'static,
    ) {
        self.handlers.insert(resource_type.into(), Arc::new(handler));
    }

    pub fn handler(&self, resource_type: &str) -> Option<Arc<dyn RollbackHandler>> {
        self.handlers.get(resource_type).cloned()
    }

    /// Resource types with a registered handler, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for RollbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackRegistry")
            .field("resource_types", &self.resource_types())
            .finish()
    }
}

/// What a successful rollback did.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub sequence: u64,
    /// The chained `RESTORE` entry, when chained rollbacks are enabled.
    pub restore_entry: Option<AuditEntry>,
    /// Why the `RESTORE` entry could not be appended. The rollback itself
    /// completed; `RollbackCoordinator::record_restore` retries the entry.
    pub restore_error: Option<String>,
}

/// Dispatches rollbacks to producer handlers and records their completion.
pub struct RollbackCoordinator {
    store: Arc<dyn AuditStore>,
    registry: RollbackRegistry,
    recorder: Option<Arc<dyn AuditRecorder>>,
    in_flight: Mutex<HashSet<u64>>,
}

impl RollbackCoordinator {
    pub fn new(store: Arc<dyn AuditStore>, registry: RollbackRegistry) -> Self {
        Self {
            store,
            registry,
            recorder: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Also append a chained `RESTORE` entry for every completed rollback.
    pub fn with_chained_rollbacks(mut self, recorder: Arc<dyn AuditRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Roll back the action recorded at `sequence`.
    ///
    /// # Errors
    ///
    /// - `EntryNotFound` if no entry exists at `sequence`.
    /// - `RollbackFailed` if the entry is not rollbackable, was already
    ///   rolled back, has no registered handler, is being rolled back
    ///   concurrently, or the handler itself fails.
    /// - `PersistenceFailure` if the annotation cannot be written after the
    ///   handler succeeded.
    ///
    /// A failure to append the chained `RESTORE` entry is not an error here;
    /// it is carried in `RollbackOutcome::restore_error`.
    pub fn rollback(&self, sequence: u64) -> ChainlogResult<RollbackOutcome> {
        let entry = self.eligible_entry(sequence)?;

        let handler = self.registry.handler(&entry.resource_type).ok_or_else(|| {
            rollback_failed(
                sequence,
                format!(
                    "no rollback handler registered for resource type '{}'",
                    entry.resource_type
                ),
            )
        })?;

        let _claim = InFlightClaim::acquire(&self.in_flight, sequence)?;

        // Re-check under the claim: a concurrent rollback may have finished
        // between the first check and acquiring the claim.
        let entry = self.eligible_entry(sequence)?;

        if let Err(err) = handler.rollback(sequence, &entry.details) {
            warn!(sequence, error = %err, "compensating action failed; entry stays eligible");
            return Err(rollback_failed(sequence, err.to_string()));
        }

        self.store.set_rollback_executed(sequence)?;
        info!(summary = %entry.summary(), "rollback executed");

        let (restore_entry, restore_error) = match &self.recorder {
            Some(recorder) => match restore_event(&entry).and_then(|e| recorder.record(e)) {
                Ok(restore) => (Some(restore), None),
                Err(err) => {
                    error!(sequence, error = %err, "rollback executed but RESTORE entry not recorded");
                    (None, Some(err.to_string()))
                }
            },
            None => (None, None),
        };

        Ok(RollbackOutcome {
            sequence,
            restore_entry,
            restore_error,
        })
    }

    /// Append the chained `RESTORE` entry for an already rolled-back entry.
    ///
    /// Returns the existing `RESTORE` entry if one is already in the chain,
    /// so retrying after a reported `restore_error` never duplicates it.
    ///
    /// # Errors
    ///
    /// - `EntryNotFound` if no entry exists at `sequence`.
    /// - `RollbackFailed` if chained rollbacks are disabled or the entry has
    ///   not been rolled back.
    /// - Any error of the recorder.
    pub fn record_restore(&self, sequence: u64) -> ChainlogResult<AuditEntry> {
        let recorder = self
            .recorder
            .as_ref()
            .ok_or_else(|| rollback_failed(sequence, "chained rollbacks are not enabled"))?;

        let entry = self
            .store
            .get(sequence)?
            .ok_or(ChainlogError::EntryNotFound { sequence })?;
        if !entry.rollback_executed {
            return Err(rollback_failed(sequence, "rollback has not been executed"));
        }

        let _claim = InFlightClaim::acquire(&self.in_flight, sequence)?;

        let event = restore_event(&entry)?;
        let restores = self.store.matching(&AuditFilter {
            action_type: Some(ActionType::Restore),
            resource_type: Some(entry.resource_type.clone()),
            ..Default::default()
        })?;
        let marker = event.details.get("rolled_back_sequence");
        if let Some(existing) = restores
            .into_iter()
            .find(|r| r.details.get("rolled_back_sequence") == marker)
        {
            return Ok(existing);
        }

        let restore = recorder.record(event)?;
        info!(sequence, restore = restore.sequence, "RESTORE entry recorded");
        Ok(restore)
    }

    fn eligible_entry(&self, sequence: u64) -> ChainlogResult<AuditEntry> {
        let entry = self
            .store
            .get(sequence)?
            .ok_or(ChainlogError::EntryNotFound { sequence })?;

        if !entry.is_rollbackable {
            return Err(rollback_failed(sequence, "entry is not rollbackable"));
        }
        if entry.rollback_executed {
            return Err(rollback_failed(sequence, "rollback already executed"));
        }
        Ok(entry)
    }
}

impl std::fmt::Debug for RollbackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackCoordinator")
            .field("registry", &self.registry)
            .field("chained", &self.recorder.is_some())
            .finish_non_exhaustive()
    }
}

fn rollback_failed(sequence: u64, reason: impl Into<String>) -> ChainlogError {
    ChainlogError::RollbackFailed {
        sequence,
        reason: reason.into(),
    }
}

/// The chained record of a completed rollback.
fn restore_event(original: &AuditEntry) -> ChainlogResult<AuditEvent> {
    let rolled_back =
        i64::try_from(original.sequence).map_err(|_| ChainlogError::EncodingFailure {
            reason: format!("sequence {} does not fit a detail integer", original.sequence),
        })?;
    let mut event = AuditEvent::new(Actor::System, ActionType::Restore, &original.resource_type)
        .details(DetailValue::map([
            ("rolled_back_sequence", DetailValue::Integer(rolled_back)),
            ("original_action", DetailValue::from(original.action_type.as_str())),
            ("original_entry_hash", DetailValue::from(original.entry_hash.as_str())),
        ]));
    event.resource_id = original.resource_id.clone();
    event.resource_name = original.resource_name.clone();
    Ok(event)
}

/// Marks a sequence as being rolled back; released on drop.
struct InFlightClaim<'a> {
    set: &'a Mutex<HashSet<u64>>,
    sequence: u64,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(set: &'a Mutex<HashSet<u64>>, sequence: u64) -> ChainlogResult<Self> {
        let mut guard = set.lock().map_err(|e| ChainlogError::PersistenceFailure {
            reason: format!("rollback lock poisoned: {e}"),
        })?;
        if !guard.insert(sequence) {
            return Err(rollback_failed(sequence, "rollback already in progress"));
        }
        Ok(Self { set, sequence })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.set.lock() {
            guard.remove(&self.sequence);
        }
    }
}
