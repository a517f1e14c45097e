//! # chainlog-core
//!
//! The write path and the read façades of the chainlog audit engine.
//!
//! This crate provides:
//! - The seam traits (`AuditRecorder`, `AuditStore`, `RollbackHandler`)
//! - The entry codec (`codec`): canonical bytes and SHA-256 digests
//! - `AuditEngine`, the hash-chain core behind `record`
//! - `AuditQuery`, the read-only filter / page / export façade
//! - `RollbackCoordinator`, the dispatcher for compensating actions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chainlog_core::{AuditEngine, AuditQuery};
//! use chainlog_contracts::{ActionType, Actor, AuditEvent, AuditFilter};
//!
//! let engine = AuditEngine::open(store.clone())?;
//! engine.record(AuditEvent::new(Actor::principal("alice"), ActionType::Create, "vm").resource_id("101"))?;
//!
//! let page = AuditQuery::new(store).list(&AuditFilter::default(), 1, 50)?;
//! ```

pub mod codec;
pub mod engine;
pub mod query;
pub mod rollback;
pub mod traits;

pub use codec::{canonicalize, decode, digest, recompute_entry_hash, CanonicalFields};
pub use engine::{AuditEngine, ChainHead};
pub use query::AuditQuery;
pub use rollback::{RollbackCoordinator, RollbackOutcome, RollbackRegistry};
pub use traits::{AuditRecorder, AuditStore, RollbackHandler};

// ── Tests ─────────────────────────────────────────────────────────────────────
