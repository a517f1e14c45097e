//! The producer-side request to record an action.
//!
//! `AuditEvent` carries exactly the fields a producer controls. Sequence,
//! timestamp and hashes are assigned by the engine at commit time.

use serde::{Deserialize, Serialize};

use crate::{
    entry::{ActionType, Actor},
    value::DetailValue,
};

/// A request to append one action to the audit chain.
///
/// ```rust,ignore
/// let event = AuditEvent::new(Actor::principal("alice"), ActionType::Update, "vm")
///     .resource_id("101")
///     .resource_name("web-01")
///     .details(DetailValue::map([("memory_mb", 4096i64)]))
///     .ip_address("10.0.0.7")
///     .rollbackable(true);
/// engine.record(event)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: Actor,
    pub action_type: ActionType,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub details: DetailValue,
    pub ip_address: Option<String>,
    pub is_rollbackable: bool,
}

impl AuditEvent {
    /// Start an event with an empty `details` map and no optional fields.
    pub fn new(actor: Actor, action_type: ActionType, resource_type: impl Into<String>) -> Self {
        Self {
            actor,
            action_type,
            resource_type: resource_type.into(),
            resource_id: None,
            resource_name: None,
            details: DetailValue::empty_map(),
            ip_address: None,
            is_rollbackable: false,
        }
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    pub fn details(mut self, details: DetailValue) -> Self {
        self.details = details;
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn rollbackable(mut self, rollbackable: bool) -> Self {
        self.is_rollbackable = rollbackable;
        self
    }
}
