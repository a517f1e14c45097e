//! Audit entry types.
//!
//! `AuditEntry` is one committed link of the hash chain. Every field except
//! the rollback status is bound into `entry_hash`; see the codec in
//! `chainlog-core` for the exact byte layout.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ChainlogError, ChainlogResult},
    value::DetailValue,
};

/// The `previous_hash` of the entry at sequence 1.
///
/// 64 hex zeros, the digest-shaped stand-in for the sequence-0 predecessor.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// The fixed set of auditable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Create,
    Read,
    Update,
    Delete,
    Execute,
    Login,
    LoginFailed,
    Logout,
    Restore,
}

impl ActionType {
    /// Every action type, in declaration order.
    pub const ALL: [ActionType; 9] = [
        ActionType::Create,
        ActionType::Read,
        ActionType::Update,
        ActionType::Delete,
        ActionType::Execute,
        ActionType::Login,
        ActionType::LoginFailed,
        ActionType::Logout,
        ActionType::Restore,
    ];

    /// The stable wire name, e.g. `"LOGIN_FAILED"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "CREATE",
            ActionType::Read => "READ",
            ActionType::Update => "UPDATE",
            ActionType::Delete => "DELETE",
            ActionType::Execute => "EXECUTE",
            ActionType::Login => "LOGIN",
            ActionType::LoginFailed => "LOGIN_FAILED",
            ActionType::Logout => "LOGOUT",
            ActionType::Restore => "RESTORE",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ChainlogError;

    /// Parse a wire name. Matching is case-insensitive and accepts `-` in
    /// place of `_` (`login-failed`), which is what operators type.
    fn from_str(s: &str) -> ChainlogResult<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ActionType::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| ChainlogError::InvalidAction {
                value: s.to_string(),
            })
    }
}

/// The principal that performed an action.
///
/// Serialized as a nullable string: `null` is the system sentinel, any
/// string is a principal identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Actor {
    /// Automated, system-originated action.
    System,
    /// A named principal (user, service account, API key owner).
    Principal(String),
}

impl Actor {
    pub fn principal(id: impl Into<String>) -> Self {
        Actor::Principal(id.into())
    }

    /// The principal id, or `None` for the system sentinel.
    pub fn id(&self) -> Option<&str> {
        match self {
            Actor::System => None,
            Actor::Principal(id) => Some(id),
        }
    }
}

impl From<Option<String>> for Actor {
    fn from(v: Option<String>) -> Self {
        match v {
            None => Actor::System,
            Some(id) => Actor::Principal(id),
        }
    }
}

impl From<Actor> for Option<String> {
    fn from(actor: Actor) -> Self {
        match actor {
            Actor::System => None,
            Actor::Principal(id) => Some(id),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => f.write_str("SYSTEM"),
            Actor::Principal(id) => f.write_str(id),
        }
    }
}

/// Digest algorithm that produced an entry's `entry_hash`.
///
/// The identifier is part of the canonical bytes, so an entry can never be
/// silently re-verified under a different algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
}

impl HashAlgorithm {
    pub fn identifier(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = ChainlogError;

    fn from_str(s: &str) -> ChainlogResult<Self> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(ChainlogError::EncodingFailure {
                reason: format!("unknown hash algorithm '{other}'"),
            }),
        }
    }
}

/// One committed, hash-linked audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, starting at 1, contiguous.
    pub sequence: u64,

    /// Commit time (UTC), assigned by the engine.
    pub timestamp: DateTime<Utc>,

    pub actor: Actor,

    pub action_type: ActionType,

    pub resource_type: String,

    #[serde(default)]
    pub resource_id: Option<String>,

    #[serde(default)]
    pub resource_name: Option<String>,

    /// Producer-supplied payload, stored verbatim and hashed.
    pub details: DetailValue,

    #[serde(default)]
    pub ip_address: Option<String>,

    /// Whether the producer registered a compensating action for this entry.
    pub is_rollbackable: bool,

    /// Whether the compensating action has run.
    ///
    /// Not part of the hash input: it is the single field allowed to change
    /// after commit.
    #[serde(default)]
    pub rollback_executed: bool,

    pub hash_algorithm: HashAlgorithm,

    /// `entry_hash` of the entry at `sequence - 1`, or `GENESIS_HASH`.
    pub previous_hash: String,

    /// Lowercase hex digest over the canonical bytes of this entry.
    pub entry_hash: String,
}

impl AuditEntry {
    /// `"sequence=3 UPDATE vm/101 by alice"`, for log lines.
    pub fn summary(&self) -> String {
        format!(
            "sequence={} {} {}/{} by {}",
            self.sequence,
            self.action_type,
            self.resource_type,
            self.resource_id.as_deref().unwrap_or("-"),
            self.actor
        )
    }
}
