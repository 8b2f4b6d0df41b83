//! Append-only audit log trait.

use async_trait::async_trait;
use ballot_types::{Ballot, VoteStatus, VoterHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// One row per processing attempt. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub vote_hash: VoterHash,
    /// Subject id as text (law id, or `election:E/region:R/candidate:C`).
    pub subject_id: String,
    /// Choice as text (`oui`/`non`, or the candidate id).
    pub choice: String,
    pub status: VoteStatus,
    pub event_timestamp: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl AuditRecord {
    /// Build a record for `ballot`. The ballot's structured fields are
    /// merged into `metadata` so tallies can be rebuilt from the log.
    pub fn new(
        hash: &VoterHash,
        ballot: &Ballot,
        status: VoteStatus,
        event_timestamp: DateTime<Utc>,
        processed_at: DateTime<Utc>,
        extra: serde_json::Value,
    ) -> Self {
        let mut metadata = serde_json::json!({ "kind": ballot.kind() });
        if let (Some(map), Ok(serde_json::Value::Object(fields))) =
            (metadata.as_object_mut(), serde_json::to_value(ballot))
        {
            map.extend(fields);
            if let serde_json::Value::Object(extra) = extra {
                map.extend(extra);
            }
        }
        Self {
            vote_hash: hash.clone(),
            subject_id: ballot.subject().to_string(),
            choice: ballot.choice_label(),
            status,
            event_timestamp,
            processed_at,
            metadata,
        }
    }
}

/// Durable forensic trail written by the validator.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one audit row, returning its id.
    async fn append(&self, record: &AuditRecord) -> Result<i64, StoreError>;

    /// Record a post-first attempt for a hash in the durable duplicate
    /// history. Returns the new attempt count.
    async fn record_duplicate_attempt(
        &self,
        hash: &VoterHash,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Round-trip to the backend.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_types::LawChoice;

    #[test]
    fn metadata_carries_ballot_fields_and_extras() {
        let now = Utc::now();
        let record = AuditRecord::new(
            &VoterHash::new("h"),
            &Ballot::election(1, 2, 3),
            VoteStatus::Validated,
            now,
            now,
            serde_json::json!({"worker_id": "w-1"}),
        );
        assert_eq!(record.subject_id, "election:1/region:2/candidate:3");
        assert_eq!(record.choice, "3");
        assert_eq!(record.metadata["kind"], "election");
        assert_eq!(record.metadata["candidate_id"], 3);
        assert_eq!(record.metadata["worker_id"], "w-1");
    }

    #[test]
    fn law_record_uses_law_id_as_subject() {
        let now = Utc::now();
        let record = AuditRecord::new(
            &VoterHash::new("h"),
            &Ballot::law("LAW-1", LawChoice::Oui),
            VoteStatus::Duplicate,
            now,
            now,
            serde_json::Value::Null,
        );
        assert_eq!(record.subject_id, "LAW-1");
        assert_eq!(record.choice, "oui");
        assert_eq!(record.metadata["vote"], "oui");
    }
}
