//! Query filter, page and export types used by the read-only façade.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entry::{ActionType, Actor, AuditEntry},
    error::{ChainlogError, ChainlogResult},
};

/// Conjunctive filter over audit entries. `None` fields match everything.
///
/// `start_date` and `end_date` are both inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub action_type: Option<ActionType>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub actor: Option<Actor>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn is_empty(&self) -> bool {
        *self == AuditFilter::default()
    }

    /// Return true if `entry` satisfies every populated criterion.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(action) = self.action_type {
            if entry.action_type != action {
                return false;
            }
        }
        if let Some(resource_type) = &self.resource_type {
            if &entry.resource_type != resource_type {
                return false;
            }
        }
        if let Some(resource_id) = &self.resource_id {
            if entry.resource_id.as_ref() != Some(resource_id) {
                return false;
            }
        }
        if let Some(actor) = &self.actor {
            if &entry.actor != actor {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }
}

/// One page of a filtered listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matches across all pages.
    pub total: u64,
    /// 1-based page number actually served.
    pub page: u64,
    /// Page size actually applied (after clamping).
    pub page_size: u64,
}

impl<T> Page<T> {
    /// Number of pages needed for `total` items.
    pub fn page_count(&self) -> u64 {
        if self.page_size == 0 {
            0
        } else {
            self.total.div_ceil(self.page_size)
        }
    }
}

/// Output format for `export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ChainlogError;

    fn from_str(s: &str) -> ChainlogResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ChainlogError::ConfigError {
                reason: format!("unknown export format '{other}' (expected json or csv)"),
            }),
        }
    }
}
