//! Configuration schema.
//!
//! Every section and every field has a default, so an empty document is a
//! valid configuration (in-memory store, default batch and page sizes,
//! rollbacks as out-of-band annotations only).
//!
//! Example:
//! ```toml
//! [store]
//! backend = "file"
//! path = "/var/lib/chainlog/audit.jsonl"
//! fsync = true
//!
//! [verify]
//! batch_size = 1000
//!
//! [query]
//! default_page_size = 50
//! max_page_size = 500
//!
//! [rollback]
//! chain_rollbacks = true
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root of a chainlog configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainlogConfig {
    pub store: StoreConfig,
    pub verify: VerifyConfig,
    pub query: QueryConfig,
    pub rollback: RollbackConfig,
}

/// Which `AuditStore` backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Log file for the `file` backend. Required there, ignored otherwise.
    pub path: Option<PathBuf>,

    /// Sync every append to stable storage before acknowledging it.
    pub fsync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifyConfig {
    /// Entries read per store call while verifying.
    pub batch_size: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            batch_size: chainlog_verify::DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: chainlog_core::query::DEFAULT_PAGE_SIZE,
            max_page_size: chainlog_core::query::MAX_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RollbackConfig {
    /// Also record a chained `RESTORE` entry for every executed rollback.
    pub chain_rollbacks: bool,
}
