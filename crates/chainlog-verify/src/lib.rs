//! # chainlog-verify
//!
//! End-to-end integrity verification of a chainlog audit chain.
//!
//! `ChainVerifier` proves or disproves that a stored chain is exactly what
//! the engine committed: every entry re-hashes to its stored digest, links
//! to its predecessor, and no sequence is missing. Findings are aggregated
//! into a `VerificationResult`; `ChainStatus` turns an outcome into the
//! intact / compromised / unverifiable verdict shown to operators.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chainlog_verify::{ChainStatus, ChainVerifier};
//!
//! let verifier = ChainVerifier::new(store).with_batch_size(500);
//! let outcome = verifier.verify_chain();
//! match ChainStatus::from_outcome(&outcome) {
//!     ChainStatus::Intact => {}
//!     status => eprintln!("audit log {status}"),
//! }
//!
//! // Later: only check what was appended since.
//! if let Some(checkpoint) = outcome?.checkpoint {
//!     verifier.verify_from(&checkpoint, None)?;
//! }
//! ```

pub mod engine;
pub mod status;

pub use engine::{ChainVerifier, DEFAULT_BATCH_SIZE};
pub use status::ChainStatus;

// ── Tests ─────────────────────────────────────────────────────────────────────
