//! Nullable audit store.

use async_trait::async_trait;
use ballot_store::{AuditRecord, AuditStore, StoreError};
use ballot_types::{VoteStatus, VoterHash};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::FailureSwitch;

/// One row of the durable duplicate history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateAttempts {
    pub first_attempt: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
    pub attempt_count: u64,
}

/// Append-only in-memory [`AuditStore`].
#[derive(Default)]
pub struct NullAuditStore {
    records: Mutex<Vec<AuditRecord>>,
    duplicates: Mutex<HashMap<String, DuplicateAttempts>>,
    failures: FailureSwitch,
}

impl NullAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `append`, `record_duplicate_attempt`, `ping`, or `"*"`.
    pub fn fail_operation(&self, op: &str) {
        self.failures.fail(op);
    }

    pub fn heal_all(&self) {
        self.failures.heal_all();
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn records_for(&self, hash: &str) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.vote_hash.as_str() == hash)
            .cloned()
            .collect()
    }

    pub fn count_with_status(&self, status: VoteStatus) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == status)
            .count()
    }

    pub fn duplicate_attempts(&self, hash: &str) -> Option<DuplicateAttempts> {
        self.duplicates.lock().unwrap().get(hash).cloned()
    }

    fn check(&self, op: &str) -> Result<(), StoreError> {
        if self.failures.is_failing(op) {
            return Err(StoreError::Unavailable(format!("{op}: injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for NullAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<i64, StoreError> {
        self.check("append")?;
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(records.len() as i64)
    }

    async fn record_duplicate_attempt(
        &self,
        hash: &VoterHash,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check("record_duplicate_attempt")?;
        let mut duplicates = self.duplicates.lock().unwrap();
        let row = duplicates
            .entry(hash.to_string())
            .or_insert(DuplicateAttempts {
                first_attempt: at,
                last_attempt: at,
                attempt_count: 0,
            });
        row.last_attempt = at;
        row.attempt_count += 1;
        Ok(row.attempt_count)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check("ping")
    }
}
