//! # chainlog-contracts
//!
//! Shared types and error contracts for the chainlog tamper-evident audit
//! engine.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions, small predicates and error types.

pub mod entry;
pub mod error;
pub mod event;
pub mod query;
pub mod value;
pub mod verify;

pub use entry::{ActionType, Actor, AuditEntry, HashAlgorithm, GENESIS_HASH};
pub use error::{ChainlogError, ChainlogResult, ErrorKind};
pub use event::AuditEvent;
pub use query::{AuditFilter, ExportFormat, Page};
pub use value::DetailValue;
pub use verify::{ChainIssue, Checkpoint, SequenceRange, VerificationResult};

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn entry_at(sequence: u64, action: ActionType, resource_type: &str) -> AuditEntry {
        AuditEntry {
            sequence,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            actor: Actor::principal("alice"),
            action_type: action,
            resource_type: resource_type.to_string(),
            resource_id: Some("101".to_string()),
            resource_name: Some("web-01".to_string()),
            details: DetailValue::empty_map(),
            ip_address: None,
            is_rollbackable: false,
            rollback_executed: false,
            hash_algorithm: HashAlgorithm::Sha256,
            previous_hash: GENESIS_HASH.to_string(),
            entry_hash: GENESIS_HASH.to_string(),
        }
    }

    // ── ActionType ───────────────────────────────────────────────────────────

    #[test]
    fn action_type_parses_wire_names_case_insensitively() {
        assert_eq!("CREATE".parse::<ActionType>().unwrap(), ActionType::Create);
        assert_eq!("update".parse::<ActionType>().unwrap(), ActionType::Update);
        assert_eq!(
            "login-failed".parse::<ActionType>().unwrap(),
            ActionType::LoginFailed
        );
    }

    #[test]
    fn action_type_rejects_unknown_names() {
        let err = "PURGE".parse::<ActionType>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAction);
        assert!(err.to_string().contains("PURGE"));
    }

    #[test]
    fn action_type_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ActionType::LoginFailed).unwrap();
        assert_eq!(json, "\"LOGIN_FAILED\"");
        for action in ActionType::ALL {
            let wire = serde_json::to_string(&action).unwrap();
            assert_eq!(wire, format!("\"{}\"", action.as_str()));
        }
    }

    // ── Actor ────────────────────────────────────────────────────────────────

    #[test]
    fn actor_system_serializes_as_null() {
        assert_eq!(serde_json::to_value(Actor::System).unwrap(), json!(null));
        assert_eq!(
            serde_json::to_value(Actor::principal("alice")).unwrap(),
            json!("alice")
        );

        let decoded: Actor = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(decoded, Actor::System);
        assert_eq!(Actor::System.to_string(), "SYSTEM");
    }

    // ── DetailValue ──────────────────────────────────────────────────────────

    #[test]
    fn detail_value_map_sorts_keys_regardless_of_insertion_order() {
        let a = DetailValue::map([("zeta", 1i64), ("alpha", 2i64)]);
        let b = DetailValue::map([("alpha", 2i64), ("zeta", 1i64)]);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            r#"{"alpha":2,"zeta":1}"#
        );
    }

    #[test]
    fn detail_value_from_json_keeps_integers_and_floats_apart() {
        let value = DetailValue::try_from(json!({ "cores": 4, "ratio": 0.5, "tags": ["a", null] }))
            .unwrap();
        assert_eq!(value.get("cores"), Some(&DetailValue::Integer(4)));
        assert_eq!(value.get("ratio"), Some(&DetailValue::Float(0.5)));
        assert_eq!(
            value.get("tags"),
            Some(&DetailValue::List(vec![
                DetailValue::Text("a".to_string()),
                DetailValue::Null
            ]))
        );
    }

    #[test]
    fn detail_value_rejects_integers_beyond_i64() {
        let err = DetailValue::try_from(json!({ "big": u64::MAX })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodingFailure);
    }

    #[test]
    fn detail_value_json_round_trip_preserves_float_tag() {
        let value = DetailValue::map([("whole", DetailValue::Float(2.0))]);
        let text = serde_json::to_string(&value).unwrap();
        let decoded: DetailValue = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, value);
    }

    // ── AuditFilter ──────────────────────────────────────────────────────────

    #[test]
    fn empty_filter_matches_everything() {
        let filter = AuditFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&entry_at(1, ActionType::Delete, "vm")));
    }

    #[test]
    fn filter_criteria_are_conjunctive() {
        let entry = entry_at(1, ActionType::Update, "vm");
        let filter = AuditFilter {
            action_type: Some(ActionType::Update),
            resource_type: Some("vm".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&entry));

        let wrong_type = AuditFilter {
            resource_type: Some("inventory".to_string()),
            ..filter.clone()
        };
        assert!(!wrong_type.matches(&entry));
    }

    #[test]
    fn filter_date_bounds_are_inclusive() {
        let entry = entry_at(1, ActionType::Create, "vm");
        let at = entry.timestamp;

        let exact = AuditFilter {
            start_date: Some(at),
            end_date: Some(at),
            ..Default::default()
        };
        assert!(exact.matches(&entry));

        let after = AuditFilter {
            start_date: Some(at + Duration::milliseconds(1)),
            ..Default::default()
        };
        assert!(!after.matches(&entry));
    }

    #[test]
    fn page_count_rounds_up() {
        let page: Page<u64> = Page {
            items: vec![],
            total: 11,
            page: 1,
            page_size: 5,
        };
        assert_eq!(page.page_count(), 3);
    }

    // ── Errors ───────────────────────────────────────────────────────────────

    #[test]
    fn error_kinds_map_to_taxonomy() {
        let cases = [
            (
                ChainlogError::PersistenceFailure {
                    reason: "disk full".to_string(),
                },
                ErrorKind::PersistenceFailure,
                "disk full",
            ),
            (
                ChainlogError::SequenceConflict { sequence: 7 },
                ErrorKind::SequenceConflict,
                "sequence 7",
            ),
            (
                ChainlogError::RollbackFailed {
                    sequence: 3,
                    reason: "handler refused".to_string(),
                },
                ErrorKind::RollbackFailed,
                "handler refused",
            ),
        ];

        for (err, kind, fragment) in cases {
            assert_eq!(err.kind(), kind);
            assert!(err.to_string().contains(fragment), "{err}");
        }
    }

    #[test]
    fn export_format_parses() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
