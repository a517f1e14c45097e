//! Read-only query façade for audit viewers.
//!
//! Nothing here participates in integrity: it lists, counts and exports
//! what the store holds, ascending by sequence.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use chainlog_contracts::{
    entry::{ActionType, AuditEntry},
    error::{ChainlogError, ChainlogResult},
    query::{AuditFilter, ExportFormat, Page},
};

use crate::traits::AuditStore;

/// Page size used when the caller passes 0.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Upper bound applied to any requested page size.
pub const MAX_PAGE_SIZE: u64 = 500;

const CSV_HEADER: [&str; 14] = [
    "sequence",
    "timestamp",
    "actor",
    "action_type",
    "resource_type",
    "resource_id",
    "resource_name",
    "details",
    "ip_address",
    "is_rollbackable",
    "rollback_executed",
    "hash_algorithm",
    "previous_hash",
    "entry_hash",
];

/// Paginated, filtered reads over an `AuditStore`.
#[derive(Clone)]
pub struct AuditQuery {
    store: Arc<dyn AuditStore>,
    default_page_size: u64,
    max_page_size: u64,
}

impl AuditQuery {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Override the page-size defaults. `max` is raised to `default` if lower.
    pub fn with_page_limits(mut self, default: u64, max: u64) -> Self {
        self.default_page_size = default.max(1);
        self.max_page_size = max.max(self.default_page_size);
        self
    }

    /// Point lookup, failing with `EntryNotFound` for an absent sequence.
    pub fn get(&self, sequence: u64) -> ChainlogResult<AuditEntry> {
        self.store
            .get(sequence)?
            .ok_or(ChainlogError::EntryNotFound { sequence })
    }

    /// One page of entries matching `filter`, ascending by sequence.
    ///
    /// `page` is 1-based (0 is treated as 1). `page_size` 0 selects the
    /// default; anything above the maximum is clamped. A page past the end
    /// is empty but still reports `total`.
    pub fn list(
        &self,
        filter: &AuditFilter,
        page: u64,
        page_size: u64,
    ) -> ChainlogResult<Page<AuditEntry>> {
        let page = page.max(1);
        let page_size = if page_size == 0 {
            self.default_page_size
        } else {
            page_size.min(self.max_page_size)
        };

        let matches = self.store.matching(filter)?;
        let total = matches.len() as u64;
        let skip = (page - 1).saturating_mul(page_size);

        let items: Vec<AuditEntry> = matches
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(page_size).unwrap_or(usize::MAX))
            .collect();

        debug!(total, page, page_size, returned = items.len(), "audit list served");

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Distinct action types present in the log, in declaration order.
    pub fn get_action_types(&self) -> ChainlogResult<Vec<ActionType>> {
        let seen: BTreeSet<ActionType> = self
            .store
            .matching(&AuditFilter::default())?
            .into_iter()
            .map(|e| e.action_type)
            .collect();
        Ok(seen.into_iter().collect())
    }

    /// Distinct resource types present in the log, sorted.
    pub fn get_resource_types(&self) -> ChainlogResult<Vec<String>> {
        let seen: BTreeSet<String> = self
            .store
            .matching(&AuditFilter::default())?
            .into_iter()
            .map(|e| e.resource_type)
            .collect();
        Ok(seen.into_iter().collect())
    }

    /// Serialize every entry matching `filter`.
    ///
    /// JSON is a pretty-printed array. CSV follows RFC 4180 with a header
    /// row; `details` is embedded as compact JSON.
    pub fn export(&self, format: ExportFormat, filter: &AuditFilter) -> ChainlogResult<Vec<u8>> {
        let entries = self.store.matching(filter)?;
        debug!(%format, count = entries.len(), "exporting audit entries");

        match format {
            ExportFormat::Json => {
                serde_json::to_vec_pretty(&entries).map_err(|e| ChainlogError::EncodingFailure {
                    reason: format!("failed to serialize export: {e}"),
                })
            }
            ExportFormat::Csv => {
                let mut out = String::new();
                push_csv_row(&mut out, CSV_HEADER.iter().map(|s| s.to_string()));
                for entry in &entries {
                    push_csv_row(&mut out, csv_fields(entry)?.into_iter());
                }
                Ok(out.into_bytes())
            }
        }
    }
}

fn csv_fields(entry: &AuditEntry) -> ChainlogResult<Vec<String>> {
    let details = serde_json::to_string(&entry.details).map_err(|e| {
        ChainlogError::EncodingFailure {
            reason: format!("failed to serialize details of entry {}: {e}", entry.sequence),
        }
    })?;

    Ok(vec![
        entry.sequence.to_string(),
        entry.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
        entry.actor.to_string(),
        entry.action_type.to_string(),
        entry.resource_type.clone(),
        entry.resource_id.clone().unwrap_or_default(),
        entry.resource_name.clone().unwrap_or_default(),
        details,
        entry.ip_address.clone().unwrap_or_default(),
        entry.is_rollbackable.to_string(),
        entry.rollback_executed.to_string(),
        entry.hash_algorithm.identifier().to_string(),
        entry.previous_hash.clone(),
        entry.entry_hash.clone(),
    ])
}

fn push_csv_row(out: &mut String, fields: impl Iterator<Item = String>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains(&[',', '"', '\n', '\r'][..]) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&field);
        }
    }
    out.push_str("\r\n");
}

impl std::fmt::Debug for AuditQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditQuery")
            .field("default_page_size", &self.default_page_size)
            .field("max_page_size", &self.max_page_size)
            .finish_non_exhaustive()
    }
}
