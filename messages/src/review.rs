//! Review entries for operators: anomalies worth a human look.

use ballot_types::{Ballot, ErrorPattern, VoterHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MessageError, MessageStatus, VoteEvent};

pub const REASON_NOT_ELIGIBLE: &str = "Hash not found in valid_hashes set";
pub const REASON_COMPENSATION_FAILED: &str =
    "Voted marker could not be rolled back after audit failure";
pub const REASON_PUBLISH_FAILED: &str =
    "Vote audited but not forwarded to aggregation; rebuild tallies";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub voter_hash: VoterHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_pattern: Option<ErrorPattern>,
    #[serde(flatten)]
    pub ballot: Ballot,
    pub vote_timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub reason: String,
    pub processed_timestamp: DateTime<Utc>,
}

impl ReviewEntry {
    /// First sighting of an ineligible-hash pattern.
    pub fn not_eligible(event: &VoteEvent, pattern: ErrorPattern, at: DateTime<Utc>) -> Self {
        Self {
            voter_hash: event.hash.clone(),
            error_pattern: Some(pattern),
            ballot: event.ballot.clone(),
            vote_timestamp: event.vote_timestamp,
            status: MessageStatus::Invalid,
            reason: REASON_NOT_ELIGIBLE.to_string(),
            processed_timestamp: at,
        }
    }

    /// A vote left marked as voted without an audit row.
    pub fn compensation_failed(event: &VoteEvent, at: DateTime<Utc>) -> Self {
        Self::flagged(event, REASON_COMPENSATION_FAILED, at)
    }

    /// A validated vote whose accepted message never reached the
    /// aggregation queue.
    pub fn publish_failed(event: &VoteEvent, at: DateTime<Utc>) -> Self {
        Self {
            status: MessageStatus::Valid,
            ..Self::flagged(event, REASON_PUBLISH_FAILED, at)
        }
    }

    fn flagged(event: &VoteEvent, reason: &str, at: DateTime<Utc>) -> Self {
        Self {
            voter_hash: event.hash.clone(),
            error_pattern: None,
            ballot: event.ballot.clone(),
            vote_timestamp: event.vote_timestamp,
            status: MessageStatus::Invalid,
            reason: reason.to_string(),
            processed_timestamp: at,
        }
    }

    pub fn from_slice(body: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }
}
