//! Raw vote submissions consumed from the validation queue.

use ballot_types::{Ballot, LawChoice, VoterHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{parse_timestamp, MessageError};

/// Longest law identifier accepted by the field check.
const MAX_LAW_ID_LEN: usize = 50;

/// A submission exactly as published by the ingestion layer.
///
/// Every field is optional here; [`RawVoteEvent::into_event`] performs the
/// field check. Unknown fields are ignored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawVoteEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub law_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranked_choices: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_timestamp: Option<String>,
}

impl RawVoteEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Check required fields and build a typed [`VoteEvent`].
    pub fn into_event(self) -> Result<VoteEvent, MessageError> {
        let hash = self
            .hash
            .map(VoterHash::new)
            .filter(|h| !h.is_empty())
            .ok_or(MessageError::MissingField("hash"))?;

        let ballot = match (self.law_id, self.election_id) {
            (Some(law_id), _) if !law_id.trim().is_empty() => {
                if law_id.len() > MAX_LAW_ID_LEN {
                    return Err(MessageError::InvalidField {
                        field: "law_id",
                        reason: format!("longer than {MAX_LAW_ID_LEN} bytes"),
                    });
                }
                let raw_vote = self.vote.ok_or(MessageError::MissingField("vote"))?;
                let vote = raw_vote
                    .parse::<LawChoice>()
                    .map_err(|e| MessageError::InvalidField {
                        field: "vote",
                        reason: e.to_string(),
                    })?;
                Ballot::Law { law_id, vote }
            }
            (_, Some(election_id)) => Ballot::Election {
                election_id,
                region_id: self.region_id.ok_or(MessageError::MissingField("region_id"))?,
                candidate_id: self
                    .candidate_id
                    .ok_or(MessageError::MissingField("candidate_id"))?,
                ranked_choices: self.ranked_choices.unwrap_or_default(),
            },
            _ => return Err(MessageError::MissingField("law_id")),
        };

        let raw_ts = self
            .vote_timestamp
            .ok_or(MessageError::MissingField("vote_timestamp"))?;
        let vote_timestamp =
            parse_timestamp(&raw_ts).ok_or_else(|| MessageError::InvalidField {
                field: "vote_timestamp",
                reason: format!("not an ISO-8601 timestamp: {raw_ts:?}"),
            })?;

        Ok(VoteEvent {
            hash,
            ballot,
            vote_timestamp,
        })
    }
}

/// A field-checked submission. Identity is entirely `hash`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteEvent {
    pub hash: VoterHash,
    pub ballot: Ballot,
    pub vote_timestamp: DateTime<Utc>,
}

impl VoteEvent {
    /// Parse and field-check a payload in one step.
    pub fn decode(body: &[u8]) -> Result<Self, MessageError> {
        RawVoteEvent::from_slice(body)?.into_event()
    }

    /// Serialize in the submission format (used by publishers and tests).
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, MessageError> {
        let mut raw = RawVoteEvent {
            hash: Some(self.hash.to_string()),
            vote_timestamp: Some(self.vote_timestamp.to_rfc3339()),
            ..Default::default()
        };
        match &self.ballot {
            Ballot::Law { law_id, vote } => {
                raw.law_id = Some(law_id.clone());
                raw.vote = Some(vote.to_string());
            }
            Ballot::Election {
                election_id,
                region_id,
                candidate_id,
                ranked_choices,
            } => {
                raw.election_id = Some(*election_id);
                raw.region_id = Some(*region_id);
                raw.candidate_id = Some(*candidate_id);
                if !ranked_choices.is_empty() {
                    raw.ranked_choices = Some(ranked_choices.clone());
                }
            }
        }
        Ok(serde_json::to_vec(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_law_vote() {
        let body = br#"{"hash":"h1","law_id":"LAW-1","vote":"OUI","vote_timestamp":"2024-05-01T12:00:00"}"#;
        let event = VoteEvent::decode(body).unwrap();
        assert_eq!(event.hash.as_str(), "h1");
        assert_eq!(event.ballot, Ballot::law("LAW-1", LawChoice::Oui));
    }

    #[test]
    fn decodes_election_vote_with_ranking() {
        let body = br#"{"hash":"h2","election_id":1,"region_id":4,"candidate_id":7,
            "ranked_choices":[7,2,9],"vote_timestamp":"2024-05-01T12:00:00Z"}"#;
        let event = VoteEvent::decode(body).unwrap();
        match event.ballot {
            Ballot::Election {
                candidate_id,
                ranked_choices,
                ..
            } => {
                assert_eq!(candidate_id, 7);
                assert_eq!(ranked_choices, vec![7, 2, 9]);
            }
            other => panic!("expected election ballot, got {other:?}"),
        }
    }

    #[test]
    fn non_json_is_malformed() {
        let err = VoteEvent::decode(b"not json at all").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn json_array_is_malformed() {
        let err = VoteEvent::decode(b"[1,2,3]").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn missing_hash_is_a_field_error() {
        let err = VoteEvent::decode(br#"{"law_id":"L","vote":"oui","vote_timestamp":"2024-05-01T12:00:00Z"}"#)
            .unwrap_err();
        assert!(matches!(err, MessageError::MissingField("hash")));
    }

    #[test]
    fn empty_hash_is_a_field_error() {
        let err = VoteEvent::decode(br#"{"hash":"","law_id":"L","vote":"oui","vote_timestamp":"2024-05-01T12:00:00Z"}"#)
            .unwrap_err();
        assert!(matches!(err, MessageError::MissingField("hash")));
    }

    #[test]
    fn unknown_choice_is_rejected() {
        let err = VoteEvent::decode(br#"{"hash":"h","law_id":"L","vote":"peut-etre","vote_timestamp":"2024-05-01T12:00:00Z"}"#)
            .unwrap_err();
        assert!(matches!(err, MessageError::InvalidField { field: "vote", .. }));
    }

    #[test]
    fn election_without_region_is_rejected() {
        let err = VoteEvent::decode(br#"{"hash":"h","election_id":1,"candidate_id":2,"vote_timestamp":"2024-05-01T12:00:00Z"}"#)
            .unwrap_err();
        assert!(matches!(err, MessageError::MissingField("region_id")));
    }

    #[test]
    fn missing_subject_is_rejected() {
        let err = VoteEvent::decode(br#"{"hash":"h","vote":"oui","vote_timestamp":"2024-05-01T12:00:00Z"}"#)
            .unwrap_err();
        assert!(matches!(err, MessageError::MissingField("law_id")));
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let err = VoteEvent::decode(br#"{"hash":"h","law_id":"L","vote":"oui","vote_timestamp":"soon"}"#)
            .unwrap_err();
        assert!(matches!(err, MessageError::InvalidField { field: "vote_timestamp", .. }));
    }

    #[test]
    fn overlong_law_id_is_rejected() {
        let law_id = "L".repeat(51);
        let body = format!(
            r#"{{"hash":"h","law_id":"{law_id}","vote":"oui","vote_timestamp":"2024-05-01T12:00:00Z"}}"#
        );
        let err = VoteEvent::decode(body.as_bytes()).unwrap_err();
        assert!(matches!(err, MessageError::InvalidField { field: "law_id", .. }));
    }

    #[test]
    fn encoding_decodes_back_to_the_same_event() {
        let event = VoteEvent::decode(
            br#"{"hash":"h3","law_id":"LAW-9","vote":"non","vote_timestamp":"2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        let again = VoteEvent::decode(&event.to_json_bytes().unwrap()).unwrap();
        assert_eq!(again, event);
    }
}
