//! `chainlog demo`: the VM lifecycle scenario followed by a tampering
//! demonstration, all against in-memory stores.

use std::sync::Arc;

use tracing::info;

use chainlog_contracts::{
    entry::{ActionType, Actor, AuditEntry},
    error::{ChainlogError, ChainlogResult},
    event::AuditEvent,
    query::{AuditFilter, ExportFormat},
    value::DetailValue,
};
use chainlog_core::{AuditEngine, AuditQuery, RollbackCoordinator, RollbackRegistry};
use chainlog_store::InMemoryAuditStore;
use chainlog_verify::{ChainStatus, ChainVerifier};

use crate::commands::{print_row, report};

pub fn run() -> ChainlogResult<()> {
    print_banner();

    let store = Arc::new(InMemoryAuditStore::new());
    let engine = Arc::new(AuditEngine::open(store.clone())?);
    let query = AuditQuery::new(store.clone());
    let verifier = ChainVerifier::new(store.clone());

    // ── Step 1: a producer records a VM lifecycle ─────────────────────────────
    println!("[1] alice creates, resizes and deletes vm/101");
    let alice = || Actor::principal("alice");
    engine.record(
        AuditEvent::new(alice(), ActionType::Create, "vm")
            .resource_id("101")
            .resource_name("web-01")
            .details(DetailValue::map([("cpu", 2i64), ("memory_mb", 2048i64)]))
            .ip_address("10.0.0.15"),
    )?;
    engine.record(
        AuditEvent::new(alice(), ActionType::Update, "vm")
            .resource_id("101")
            .resource_name("web-01")
            .details(DetailValue::map([
                ("memory_mb", DetailValue::from(4096i64)),
                ("previous_memory_mb", DetailValue::from(2048i64)),
            ]))
            .ip_address("10.0.0.15"),
    )?;
    let deleted = engine.record(
        AuditEvent::new(alice(), ActionType::Delete, "vm")
            .resource_id("101")
            .resource_name("web-01")
            .details(DetailValue::map([("snapshot", "snap-101-final")]))
            .ip_address("10.0.0.15")
            .rollbackable(true),
    )?;

    let vm_filter = AuditFilter {
        resource_type: Some("vm".to_string()),
        ..Default::default()
    };
    for entry in query.list(&vm_filter, 1, 50)?.items {
        print_row(&entry);
    }
    println!();

    // ── Step 2: verify the untouched chain ────────────────────────────────────
    println!("[2] verifying the chain");
    let outcome = verifier.verify_chain();
    show(&outcome)?;

    // ── Step 3: roll back the delete ──────────────────────────────────────────
    println!("[3] rolling back entry #{} (restore from snapshot)", deleted.sequence);
    let mut registry = RollbackRegistry::new();
    registry.register("vm", |sequence: u64, details: &DetailValue| -> ChainlogResult<()> {
        let snapshot = details.get("snapshot").and_then(DetailValue::as_str).unwrap_or("-");
        info!(sequence, snapshot, "restoring vm from snapshot");
        println!("    compensating action: restore vm from {snapshot}");
        Ok(())
    });
    let rollback = RollbackCoordinator::new(store.clone(), registry)
        .with_chained_rollbacks(engine.clone());
    let outcome = rollback.rollback(deleted.sequence)?;
    if let Some(restore) = &outcome.restore_entry {
        print_row(restore);
    }
    if let Some(reason) = &outcome.restore_error {
        println!("    RESTORE entry not recorded: {reason}");
    }
    match rollback.rollback(deleted.sequence) {
        Err(e) => println!("    second attempt refused: {e}"),
        Ok(_) => println!("    second attempt unexpectedly succeeded"),
    }
    println!();

    println!("[4] verifying again (rollback annotation is outside the hash chain)");
    show(&verifier.verify_chain())?;

    // ── Step 5: tamper with an exported copy ──────────────────────────────────
    println!("[5] editing one field of an exported copy");
    let exported = query.export(ExportFormat::Json, &AuditFilter::default())?;
    let mut entries: Vec<AuditEntry> =
        serde_json::from_slice(&exported).map_err(|e| ChainlogError::EncodingFailure {
            reason: format!("failed to read back export: {e}"),
        })?;
    entries[1].details = DetailValue::map([
        ("memory_mb", DetailValue::from(1024i64)),
        ("previous_memory_mb", DetailValue::from(2048i64)),
    ]);
    let edited = Arc::new(InMemoryAuditStore::from_entries(entries.clone())?);
    show(&ChainVerifier::new(edited).verify_chain())?;

    println!("[6] deleting entry #1 from the copy");
    entries.remove(0);
    let pruned = Arc::new(InMemoryAuditStore::from_entries(entries)?);
    show(&ChainVerifier::new(pruned).verify_chain())?;

    println!("Demo complete.");
    Ok(())
}

fn show(outcome: &ChainlogResult<chainlog_contracts::VerificationResult>) -> ChainlogResult<()> {
    match outcome {
        Ok(result) => report(result, false)?,
        Err(e) => println!("verification failed: {e}"),
    }
    println!("status: {}", ChainStatus::from_outcome(outcome));
    println!();
    Ok(())
}

fn print_banner() {
    println!();
    println!("chainlog: tamper-evident audit log");
    println!("===================================");
    println!();
    println!("Every entry carries:");
    println!("  [1] a gapless sequence number starting at 1");
    println!("  [2] the SHA-256 hash of its predecessor (64 zeros for the first)");
    println!("  [3] its own SHA-256 hash over a canonical binary encoding");
    println!();
}
