//! Operator-facing classification of a verification outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

use chainlog_contracts::{error::ChainlogResult, verify::VerificationResult};

/// What a viewer shows for a verification run.
///
/// `Compromised` (the log was read and is not intact) and `Unverifiable`
/// (the log could not be read) are different severities and must not be
/// merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Intact,
    Compromised,
    Unverifiable,
}

impl ChainStatus {
    pub fn from_outcome(outcome: &ChainlogResult<VerificationResult>) -> Self {
        match outcome {
            Ok(result) if result.is_valid => ChainStatus::Intact,
            Ok(_) => ChainStatus::Compromised,
            Err(_) => ChainStatus::Unverifiable,
        }
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainStatus::Intact => "INTACT",
            ChainStatus::Compromised => "COMPROMISED",
            ChainStatus::Unverifiable => "UNVERIFIABLE",
        };
        f.write_str(s)
    }
}
