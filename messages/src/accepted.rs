//! Accepted votes, published by the validator for the aggregator.

use ballot_types::{Ballot, VoterHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MessageError, MessageStatus, VoteEvent};

/// The only contract between the validator and the aggregator.
///
/// Published once per hash, after the `validated` audit row is committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedVote {
    pub voter_hash: VoterHash,
    #[serde(flatten)]
    pub ballot: Ballot,
    pub vote_timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub processed_timestamp: DateTime<Utc>,
}

impl AcceptedVote {
    pub fn from_event(event: &VoteEvent, processed_at: DateTime<Utc>) -> Self {
        Self {
            voter_hash: event.hash.clone(),
            ballot: event.ballot.clone(),
            vote_timestamp: event.vote_timestamp,
            status: MessageStatus::Valid,
            processed_timestamp: processed_at,
        }
    }

    pub fn from_slice(body: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_types::LawChoice;
    use chrono::TimeZone;

    fn event() -> VoteEvent {
        VoteEvent {
            hash: VoterHash::new("abc"),
            ballot: Ballot::law("LAW-1", LawChoice::Oui),
            vote_timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn wire_shape_flattens_the_ballot() {
        let processed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();
        let vote = AcceptedVote::from_event(&event(), processed);
        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(json["voter_hash"], "abc");
        assert_eq!(json["law_id"], "LAW-1");
        assert_eq!(json["vote"], "oui");
        assert_eq!(json["status"], "valid");
        assert!(json.get("ballot").is_none());
    }

    #[test]
    fn decodes_election_vote() {
        let body = br#"{"voter_hash":"h","election_id":3,"region_id":1,"candidate_id":8,
            "vote_timestamp":"2024-05-01T12:00:00Z","status":"valid",
            "processed_timestamp":"2024-05-01T12:00:01Z"}"#;
        let vote = AcceptedVote::from_slice(body).unwrap();
        assert_eq!(vote.ballot, Ballot::election(3, 1, 8));
    }

    #[test]
    fn missing_ballot_fields_fail_to_decode() {
        let body = br#"{"voter_hash":"h","vote_timestamp":"2024-05-01T12:00:00Z",
            "status":"valid","processed_timestamp":"2024-05-01T12:00:01Z"}"#;
        assert!(AcceptedVote::from_slice(body).is_err());
    }
}
