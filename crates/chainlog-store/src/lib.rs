//! # chainlog-store
//!
//! `AuditStore` backends for the chainlog audit chain.
//!
//! - `InMemoryAuditStore`: volatile, indexed by `action_type`,
//!   `resource_type` and `timestamp`.
//! - `FileAuditStore`: append-only JSON-lines file with a rollback sidecar,
//!   loaded into the same indexed cache on open.
//!
//! Both are write-once per sequence: appending at an occupied sequence fails
//! with `SequenceConflict`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chainlog_core::AuditEngine;
//! use chainlog_store::FileAuditStore;
//!
//! let store = Arc::new(FileAuditStore::open("/var/lib/chainlog/audit.jsonl", true)?);
//! let engine = AuditEngine::open(store)?;
//! ```

pub mod file;
pub mod memory;

pub use file::FileAuditStore;
pub use memory::InMemoryAuditStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use chainlog_contracts::{
        entry::{ActionType, Actor, AuditEntry},
        error::ErrorKind,
        event::AuditEvent,
        query::{AuditFilter, ExportFormat},
        value::DetailValue,
    };
    use chainlog_core::{recompute_entry_hash, traits::AuditStore, AuditEngine, AuditQuery};

    use super::{FileAuditStore, InMemoryAuditStore};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn event(actor: &str, action: ActionType, resource_type: &str, id: &str) -> AuditEvent {
        AuditEvent::new(Actor::principal(actor), action, resource_type)
            .resource_id(id)
            .details(DetailValue::map([("source", "test")]))
    }

    /// Record a small mixed history through a real engine.
    fn populate(engine: &AuditEngine) -> Vec<AuditEntry> {
        vec![
            engine.record(event("alice", ActionType::Create, "vm", "101")).unwrap(),
            engine.record(event("alice", ActionType::Update, "vm", "101")).unwrap(),
            engine.record(event("bob", ActionType::Update, "inventory", "rack-4")).unwrap(),
            engine.record(event("alice", ActionType::Delete, "vm", "101")).unwrap(),
            engine
                .record(AuditEvent::new(Actor::System, ActionType::Login, "session"))
                .unwrap(),
        ]
    }

    fn seqs(entries: &[AuditEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.sequence).collect()
    }

    // ── In-memory store ───────────────────────────────────────────────────────

    #[test]
    fn memory_store_serves_point_range_and_last() {
        let store = Arc::new(InMemoryAuditStore::new());
        assert!(store.last().unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);

        let engine = AuditEngine::open(store.clone()).unwrap();
        let recorded = populate(&engine);

        assert_eq!(store.count().unwrap(), 5);
        assert_eq!(store.get(3).unwrap().unwrap(), recorded[2]);
        assert!(store.get(6).unwrap().is_none());
        assert_eq!(seqs(&store.get_range(2, 4).unwrap()), vec![2, 3, 4]);
        assert!(store.get_range(4, 2).unwrap().is_empty());
        assert_eq!(store.last().unwrap().unwrap().sequence, 5);
    }

    #[test]
    fn memory_store_is_write_once() {
        let store = Arc::new(InMemoryAuditStore::new());
        let engine = AuditEngine::open(store.clone()).unwrap();
        let original = engine.record(event("alice", ActionType::Create, "vm", "101")).unwrap();

        let mut forged = original.clone();
        forged.resource_id = Some("999".to_string());
        let err = store.append(&forged).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SequenceConflict);
        assert_eq!(store.get(1).unwrap().unwrap(), original);
    }

    #[test]
    fn indexed_matching_agrees_with_a_full_scan() {
        let store = Arc::new(InMemoryAuditStore::new());
        let engine = AuditEngine::open(store.clone()).unwrap();
        populate(&engine);
        let all = store.snapshot().unwrap();

        let filters = [
            AuditFilter::default(),
            AuditFilter {
                action_type: Some(ActionType::Update),
                ..Default::default()
            },
            AuditFilter {
                resource_type: Some("vm".to_string()),
                action_type: Some(ActionType::Delete),
                ..Default::default()
            },
            AuditFilter {
                resource_type: Some("vm".to_string()),
                actor: Some(Actor::principal("alice")),
                resource_id: Some("101".to_string()),
                ..Default::default()
            },
            AuditFilter {
                resource_type: Some("nonexistent".to_string()),
                ..Default::default()
            },
            AuditFilter {
                start_date: Some(all[1].timestamp),
                end_date: Some(all[3].timestamp),
                ..Default::default()
            },
        ];

        for filter in &filters {
            let expected: Vec<AuditEntry> =
                all.iter().filter(|e| filter.matches(e)).cloned().collect();
            assert_eq!(store.matching(filter).unwrap(), expected, "filter {filter:?}");
        }
    }

    #[test]
    fn date_window_is_inclusive_and_inverted_windows_are_empty() {
        let store = Arc::new(InMemoryAuditStore::new());
        let engine = AuditEngine::open(store.clone()).unwrap();
        let recorded = populate(&engine);

        let exact = AuditFilter {
            start_date: Some(recorded[0].timestamp),
            end_date: Some(recorded[0].timestamp),
            ..Default::default()
        };
        assert!(seqs(&store.matching(&exact).unwrap()).contains(&1));

        let inverted = AuditFilter {
            start_date: Some(Utc::now()),
            end_date: Some(Utc::now() - Duration::days(1)),
            ..Default::default()
        };
        assert!(store.matching(&inverted).unwrap().is_empty());
    }

    #[test]
    fn from_entries_keeps_entries_verbatim_including_gaps() {
        let source = Arc::new(InMemoryAuditStore::new());
        let engine = AuditEngine::open(source.clone()).unwrap();
        let mut recorded = populate(&engine);
        recorded.remove(2);
        recorded[0].resource_name = Some("edited".to_string());

        let imported = InMemoryAuditStore::from_entries(recorded.clone()).unwrap();
        assert_eq!(imported.snapshot().unwrap(), recorded);
        assert!(imported.get(3).unwrap().is_none());

        let mut duplicated = recorded.clone();
        duplicated.push(recorded[0].clone());
        let err = InMemoryAuditStore::from_entries(duplicated).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SequenceConflict);
    }

    #[test]
    fn rollback_mark_requires_an_existing_entry() {
        let store = InMemoryAuditStore::new();
        let err = store.set_rollback_executed(7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn rollback_mark_touches_only_the_annotation() {
        let store = Arc::new(InMemoryAuditStore::new());
        let engine = AuditEngine::open(store.clone()).unwrap();
        let before = engine.record(event("alice", ActionType::Update, "vm", "101")).unwrap();

        store.set_rollback_executed(1).unwrap();
        let after = store.get(1).unwrap().unwrap();

        assert!(after.rollback_executed);
        let mut normalized = after.clone();
        normalized.rollback_executed = false;
        assert_eq!(normalized, before);

        // The in-memory state sees the same flag.
        let state = store.state.lock().unwrap();
        assert!(state.entries[&1].rollback_executed);
    }

    // ── File store ────────────────────────────────────────────────────────────

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");

        let recorded = {
            let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
            let engine = AuditEngine::open(store).unwrap();
            populate(&engine)
        };

        let reopened = Arc::new(FileAuditStore::open(&path, true).unwrap());
        assert_eq!(reopened.count().unwrap(), 5);
        assert_eq!(reopened.get_range(1, 5).unwrap(), recorded);

        // The engine resumes after the persisted tail.
        let engine = AuditEngine::open(reopened.clone()).unwrap();
        let next = engine.record(event("carol", ActionType::Read, "vm", "101")).unwrap();
        assert_eq!(next.sequence, 6);
        assert_eq!(next.previous_hash, recorded[4].entry_hash);

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn file_store_rejects_occupied_sequence_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
        let engine = AuditEngine::open(store.clone()).unwrap();
        let entry = engine.record(event("alice", ActionType::Create, "vm", "101")).unwrap();
        let size = fs::metadata(&path).unwrap().len();

        let err = store.append(&entry).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SequenceConflict);
        assert_eq!(fs::metadata(&path).unwrap().len(), size);
    }

    #[test]
    fn float_details_survive_reopen_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let ratios = [1.0715660391465826e-75, 0.1, 2.2250738585072014e-308, 1.7976931348623157e308];
        let recorded = {
            let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
            let engine = AuditEngine::open(store).unwrap();
            ratios
                .iter()
                .map(|ratio| {
                    engine
                        .record(
                            AuditEvent::new(Actor::principal("alice"), ActionType::Update, "quota")
                                .details(DetailValue::map([("ratio", *ratio)])),
                        )
                        .unwrap()
                })
                .collect::<Vec<_>>()
        };

        let reopened = Arc::new(FileAuditStore::open(&path, false).unwrap());
        let loaded = reopened.get_range(1, 4).unwrap();
        assert_eq!(loaded, recorded);
        for entry in &loaded {
            assert_eq!(recompute_entry_hash(entry).unwrap(), entry.entry_hash);
        }

        // The same holds for a JSON export imported into a fresh store.
        let exported = AuditQuery::new(reopened)
            .export(ExportFormat::Json, &AuditFilter::default())
            .unwrap();
        let entries: Vec<AuditEntry> = serde_json::from_slice(&exported).unwrap();
        let imported = InMemoryAuditStore::from_entries(entries).unwrap();
        for entry in imported.snapshot().unwrap() {
            assert_eq!(recompute_entry_hash(&entry).unwrap(), entry.entry_hash);
        }
    }

    #[test]
    fn failed_sync_leaves_no_line_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
        let engine = AuditEngine::open(store.clone()).unwrap();
        let first = engine.record(event("alice", ActionType::Create, "vm", "101")).unwrap();
        let committed = fs::metadata(&path).unwrap().len();

        // The bytes reach the file, then the sync fails.
        let mut line = serde_json::to_string(&first).unwrap();
        line.push('\n');
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        let err = crate::file::append_bytes(&mut file, committed, line.as_bytes(), &path, |_| {
            Err(std::io::Error::other("sync failed"))
        })
        .unwrap_err();
        drop(file);
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert!(err.to_string().contains("sync failed"));
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);

        // A retry extends the chain and the log still opens.
        engine.record(event("alice", ActionType::Update, "vm", "101")).unwrap();
        drop(engine);
        drop(store);
        let reopened = FileAuditStore::open(&path, false).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn rollback_marks_live_in_the_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
        let engine = AuditEngine::open(store.clone()).unwrap();
        populate(&engine);
        let log_before = fs::read(&path).unwrap();

        store.set_rollback_executed(2).unwrap();
        assert!(store.get(2).unwrap().unwrap().rollback_executed);
        assert_eq!(fs::read(&path).unwrap(), log_before, "hashed log must not change");
        assert_eq!(fs::read_to_string(store.sidecar_path()).unwrap(), "2\n");
        drop(engine);
        drop(store);

        let reopened = FileAuditStore::open(&path, false).unwrap();
        assert!(reopened.get(2).unwrap().unwrap().rollback_executed);
        assert!(!reopened.get(1).unwrap().unwrap().rollback_executed);
    }

    #[test]
    fn torn_final_line_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
            let engine = AuditEngine::open(store).unwrap();
            populate(&engine);
        }
        let intact_len = fs::metadata(&path).unwrap().len();

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"sequence":6,"timestamp":"2026-"#).unwrap();
        drop(file);

        let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
        assert_eq!(store.count().unwrap(), 5);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);

        let engine = AuditEngine::open(store).unwrap();
        assert_eq!(
            engine.record(event("alice", ActionType::Read, "vm", "101")).unwrap().sequence,
            6
        );
        assert_eq!(FileAuditStore::open(&path, false).unwrap().count().unwrap(), 6);
    }

    #[test]
    fn corrupt_interior_line_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
            let engine = AuditEngine::open(store).unwrap();
            populate(&engine);
        }

        let text = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = text.lines().collect();
        lines[1] = "not json at all";
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        let err = FileAuditStore::open(&path, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn duplicated_line_fails_open_with_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
            let engine = AuditEngine::open(store).unwrap();
            populate(&engine);
        }

        let text = fs::read_to_string(&path).unwrap();
        let first = text.lines().next().unwrap().to_string();
        fs::write(&path, format!("{text}{first}\n")).unwrap();

        let err = FileAuditStore::open(&path, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SequenceConflict);
    }

    #[test]
    fn query_facade_reads_through_the_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = Arc::new(FileAuditStore::open(&path, false).unwrap());
        let engine = AuditEngine::open(store.clone()).unwrap();
        populate(&engine);

        let query = AuditQuery::new(store);
        let filter = AuditFilter {
            resource_type: Some("vm".to_string()),
            ..Default::default()
        };
        let page = query.list(&filter, 1, 50).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(seqs(&page.items), vec![1, 2, 4]);
        assert_eq!(
            query.get_resource_types().unwrap(),
            vec!["inventory", "session", "vm"]
        );
    }
}
