//! # chainlog-config
//!
//! TOML configuration for a chainlog deployment.
//!
//! This crate provides [`ChainlogConfig`], deserialized from a TOML document
//! with `serde` + `toml`, plus [`open_store`] and
//! [`ChainlogConfig::assemble`], which turn a configuration into a store and
//! the engine, query façade, verifier and rollback coordinator around it.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use chainlog_config::ChainlogConfig;
//! use chainlog_core::RollbackRegistry;
//!
//! let config = ChainlogConfig::from_file(Path::new("chainlog.toml"))?;
//! let services = config.assemble(RollbackRegistry::new())?;
//! services.engine.record(event)?;
//! ```

pub mod loader;
pub mod schema;

pub use loader::{open_store, AuditServices};
pub use schema::{
    ChainlogConfig, QueryConfig, RollbackConfig, StoreBackend, StoreConfig, VerifyConfig,
};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chainlog_contracts::{
        entry::{ActionType, Actor},
        error::ErrorKind,
        event::AuditEvent,
        query::AuditFilter,
        value::DetailValue,
    };
    use chainlog_core::{traits::AuditStore, RollbackRegistry};

    use super::*;

    const FULL: &str = r#"
[store]
backend = "file"
path = "/var/lib/chainlog/audit.jsonl"
fsync = true

[verify]
batch_size = 250

[query]
default_page_size = 20
max_page_size = 100

[rollback]
chain_rollbacks = true
"#;

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn empty_document_yields_defaults() {
        let config = ChainlogConfig::from_toml_str("").unwrap();
        assert_eq!(config, ChainlogConfig::default());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.verify.batch_size, chainlog_verify::DEFAULT_BATCH_SIZE);
        assert_eq!(config.query.default_page_size, 50);
        assert_eq!(config.query.max_page_size, 500);
        assert!(!config.rollback.chain_rollbacks);
    }

    #[test]
    fn full_document_parses() {
        let config = ChainlogConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(
            config.store.path,
            Some(PathBuf::from("/var/lib/chainlog/audit.jsonl"))
        );
        assert!(config.store.fsync);
        assert_eq!(config.verify.batch_size, 250);
        assert_eq!(config.query.default_page_size, 20);
        assert_eq!(config.query.max_page_size, 100);
        assert!(config.rollback.chain_rollbacks);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = ChainlogConfig::from_toml_str("[query]\nmax_page_size = 1000\n").unwrap();
        assert_eq!(config.query.default_page_size, 50);
        assert_eq!(config.query.max_page_size, 1000);
    }

    #[test]
    fn invalid_documents_are_config_errors() {
        let cases = [
            "[store\nbackend = \"memory\"",
            "[store]\nbackend = \"postgres\"",
            "[store]\nbackend = \"file\"",
            "[verify]\nbatch_size = 0",
            "[query]\ndefault_page_size = 0",
            "[query]\ndefault_page_size = 100\nmax_page_size = 10",
            "[store]\nbackend = \"memory\"\nretention_days = 30",
        ];
        for doc in cases {
            let err = ChainlogConfig::from_toml_str(doc).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "accepted: {doc}");
        }
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = ChainlogConfig::from_file(std::path::Path::new("/nonexistent/chainlog.toml"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("/nonexistent/chainlog.toml"));
    }

    // ── Wiring ────────────────────────────────────────────────────────────────

    #[test]
    fn file_config_assembles_a_persistent_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("audit.jsonl");
        let config_path = dir.path().join("chainlog.toml");
        std::fs::write(
            &config_path,
            format!(
                "[store]\nbackend = \"file\"\npath = {:?}\n\n[query]\ndefault_page_size = 2\nmax_page_size = 2\n",
                log.display().to_string()
            ),
        )
        .unwrap();

        let config = ChainlogConfig::from_file(&config_path).unwrap();
        {
            let services = config.assemble(RollbackRegistry::new()).unwrap();
            for action in [ActionType::Create, ActionType::Update, ActionType::Delete] {
                services
                    .engine
                    .record(AuditEvent::new(Actor::principal("alice"), action, "vm").resource_id("101"))
                    .unwrap();
            }
            let page = services.query.list(&AuditFilter::default(), 1, 0).unwrap();
            assert_eq!(page.items.len(), 2);
            assert_eq!(page.total, 3);
        }

        let services = config.assemble(RollbackRegistry::new()).unwrap();
        assert_eq!(services.store.count().unwrap(), 3);
        assert_eq!(services.engine.head().unwrap().sequence, 3);
        assert!(services.verifier.verify_chain().unwrap().is_valid);
    }

    #[test]
    fn chain_rollbacks_flag_reaches_the_coordinator() {
        let config = ChainlogConfig::from_toml_str("[rollback]\nchain_rollbacks = true").unwrap();
        let mut registry = RollbackRegistry::new();
        registry.register(
            "vm",
            |_: u64, _: &DetailValue| -> chainlog_contracts::ChainlogResult<()> { Ok(()) },
        );
        let services = config.assemble(registry).unwrap();

        let entry = services
            .engine
            .record(
                AuditEvent::new(Actor::principal("alice"), ActionType::Delete, "vm")
                    .resource_id("101")
                    .rollbackable(true),
            )
            .unwrap();
        let outcome = services.rollback.rollback(entry.sequence).unwrap();

        let restore = outcome.restore_entry.unwrap();
        assert_eq!(restore.sequence, 2);
        assert_eq!(restore.action_type, ActionType::Restore);
        assert!(services.verifier.verify_chain().unwrap().is_valid);
    }

    #[test]
    fn memory_backend_needs_no_path() {
        let store = open_store(&StoreConfig::default()).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}
