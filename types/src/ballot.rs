//! Ballots for the two voting modes and the subjects they are counted under.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypeError;

/// Choice on a binary law referendum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LawChoice {
    Oui,
    Non,
}

impl LawChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oui => "oui",
            Self::Non => "non",
        }
    }
}

impl FromStr for LawChoice {
    type Err = TypeError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oui" => Ok(Self::Oui),
            "non" => Ok(Self::Non),
            _ => Err(TypeError::UnknownChoice(s.to_string())),
        }
    }
}

impl fmt::Display for LawChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a voter selected, in either voting mode.
///
/// Serialized untagged so the wire keys match the submission format:
/// `{law_id, vote}` or `{election_id, region_id, candidate_id, ranked_choices}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ballot {
    Law {
        law_id: String,
        vote: LawChoice,
    },
    Election {
        election_id: i64,
        region_id: i64,
        candidate_id: i64,
        /// Raw ranked selection, carried through for downstream analysis only.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        ranked_choices: Vec<i64>,
    },
}

impl Ballot {
    pub fn law(law_id: impl Into<String>, vote: LawChoice) -> Self {
        Self::Law {
            law_id: law_id.into(),
            vote,
        }
    }

    pub fn election(election_id: i64, region_id: i64, candidate_id: i64) -> Self {
        Self::Election {
            election_id,
            region_id,
            candidate_id,
            ranked_choices: Vec::new(),
        }
    }

    /// The tally row this ballot increments.
    pub fn subject(&self) -> Subject {
        match self {
            Self::Law { law_id, .. } => Subject::Law(law_id.clone()),
            Self::Election {
                election_id,
                region_id,
                candidate_id,
                ..
            } => Subject::Candidate {
                election_id: *election_id,
                region_id: *region_id,
                candidate_id: *candidate_id,
            },
        }
    }

    /// The choice as recorded in the audit log's `vote` column.
    pub fn choice_label(&self) -> String {
        match self {
            Self::Law { vote, .. } => vote.as_str().to_string(),
            Self::Election { candidate_id, .. } => candidate_id.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Law { .. } => "law",
            Self::Election { .. } => "election",
        }
    }
}

/// The entity a vote is counted under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    Law(String),
    Candidate {
        election_id: i64,
        region_id: i64,
        candidate_id: i64,
    },
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Law(law_id) => f.write_str(law_id),
            Self::Candidate {
                election_id,
                region_id,
                candidate_id,
            } => write!(
                f,
                "election:{election_id}/region:{region_id}/candidate:{candidate_id}"
            ),
        }
    }
}
