//! Loading, validation and backend construction.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use chainlog_contracts::error::{ChainlogError, ChainlogResult};
use chainlog_core::{
    traits::AuditStore, AuditEngine, AuditQuery, RollbackCoordinator, RollbackRegistry,
};
use chainlog_store::{FileAuditStore, InMemoryAuditStore};
use chainlog_verify::ChainVerifier;

use crate::schema::{ChainlogConfig, StoreBackend, StoreConfig};

impl ChainlogConfig {
    /// Parse and validate a TOML document.
    ///
    /// Returns `ChainlogError::ConfigError` if the document is not valid
    /// TOML, has unknown keys, or fails `validate`.
    pub fn from_toml_str(s: &str) -> ChainlogResult<Self> {
        let config: ChainlogConfig = toml::from_str(s).map_err(|e| ChainlogError::ConfigError {
            reason: format!("failed to parse chainlog TOML: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it with `from_toml_str`.
    pub fn from_file(path: &Path) -> ChainlogResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ChainlogError::ConfigError {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), backend = ?config.store.backend, "configuration loaded");
        Ok(config)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> ChainlogResult<()> {
        if self.store.backend == StoreBackend::File && self.store.path.is_none() {
            return Err(config_error("[store] backend = \"file\" requires a path"));
        }
        if self.verify.batch_size == 0 {
            return Err(config_error("[verify] batch_size must be at least 1"));
        }
        if self.query.default_page_size == 0 {
            return Err(config_error("[query] default_page_size must be at least 1"));
        }
        if self.query.max_page_size < self.query.default_page_size {
            return Err(config_error(format!(
                "[query] max_page_size ({}) is below default_page_size ({})",
                self.query.max_page_size, self.query.default_page_size
            )));
        }
        Ok(())
    }

    /// Open the configured store and wire every component around it.
    pub fn assemble(&self, registry: RollbackRegistry) -> ChainlogResult<AuditServices> {
        let store = open_store(&self.store)?;
        let engine = Arc::new(AuditEngine::open(store.clone())?);
        let query = AuditQuery::new(store.clone())
            .with_page_limits(self.query.default_page_size, self.query.max_page_size);
        let verifier = ChainVerifier::new(store.clone()).with_batch_size(self.verify.batch_size);

        let mut rollback = RollbackCoordinator::new(store.clone(), registry);
        if self.rollback.chain_rollbacks {
            rollback = rollback.with_chained_rollbacks(engine.clone());
        }

        Ok(AuditServices {
            store,
            engine,
            query,
            verifier,
            rollback,
        })
    }
}

/// Construct the backend described by `config`.
///
/// # Errors
///
/// `ConfigError` for a file backend without a path; whatever the backend's
/// own `open` reports otherwise.
pub fn open_store(config: &StoreConfig) -> ChainlogResult<Arc<dyn AuditStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("using in-memory audit store");
            Ok(Arc::new(InMemoryAuditStore::new()))
        }
        StoreBackend::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| config_error("[store] backend = \"file\" requires a path"))?;
            info!(path = %path.display(), fsync = config.fsync, "using file audit store");
            Ok(Arc::new(FileAuditStore::open(path, config.fsync)?))
        }
    }
}

/// Every component of one audit deployment, sharing a single store.
pub struct AuditServices {
    pub store: Arc<dyn AuditStore>,
    pub engine: Arc<AuditEngine>,
    pub query: AuditQuery,
    pub verifier: ChainVerifier,
    pub rollback: RollbackCoordinator,
}

impl std::fmt::Debug for AuditServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditServices")
            .field("engine", &self.engine)
            .field("query", &self.query)
            .field("verifier", &self.verifier)
            .field("rollback", &self.rollback)
            .finish_non_exhaustive()
    }
}

fn config_error(reason: impl Into<String>) -> ChainlogError {
    ChainlogError::ConfigError {
        reason: reason.into(),
    }
}
