//! Outcome of one processing attempt, as written to the audit log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypeError;

/// Audit status of a processing attempt. Exactly one is recorded per
/// syntactically valid submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    /// Eligible, first sighting; the vote counts.
    Validated,
    /// Eligible, but the hash has already voted.
    Duplicate,
    /// Hash is not in the eligible set.
    Invalid,
}

impl VoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Duplicate => "duplicate",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validated" => Ok(Self::Validated),
            "duplicate" => Ok(Self::Duplicate),
            "invalid" => Ok(Self::Invalid),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}
