//! Nullable tally store.

use async_trait::async_trait;
use ballot_store::{StoreError, TallyDelta, TallyRecord, TallyStore};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::FailureSwitch;

#[derive(Default)]
struct Tallies {
    laws: BTreeMap<String, (i64, i64)>,
    candidates: BTreeMap<(i64, i64, i64), i64>,
}

/// In-memory [`TallyStore`]. `apply` is all-or-nothing like the real
/// transaction: a failing call leaves the tallies untouched.
#[derive(Default)]
pub struct NullTallyStore {
    tallies: Mutex<Tallies>,
    failures: FailureSwitch,
    applied_batches: AtomicUsize,
    apply_attempts: AtomicUsize,
}

impl NullTallyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `apply`, `totals`, `ping`, or `"*"`.
    pub fn fail_operation(&self, op: &str) {
        self.failures.fail(op);
    }

    pub fn heal_all(&self) {
        self.failures.heal_all();
    }

    /// `(oui, non)` for a law; zero if never tallied.
    pub fn law(&self, law_id: &str) -> (i64, i64) {
        self.tallies
            .lock()
            .unwrap()
            .laws
            .get(law_id)
            .copied()
            .unwrap_or((0, 0))
    }

    pub fn candidate(&self, election_id: i64, region_id: i64, candidate_id: i64) -> i64 {
        self.tallies
            .lock()
            .unwrap()
            .candidates
            .get(&(election_id, region_id, candidate_id))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of every counter.
    pub fn grand_total(&self) -> i64 {
        let tallies = self.tallies.lock().unwrap();
        tallies.laws.values().map(|(o, n)| o + n).sum::<i64>()
            + tallies.candidates.values().sum::<i64>()
    }

    /// Number of `apply` calls, failed ones included.
    pub fn apply_attempts(&self) -> usize {
        self.apply_attempts.load(Ordering::SeqCst)
    }

    /// Number of successful `apply` calls.
    pub fn applied_batches(&self) -> usize {
        self.applied_batches.load(Ordering::SeqCst)
    }

    fn check(&self, op: &str) -> Result<(), StoreError> {
        if self.failures.is_failing(op) {
            return Err(StoreError::Unavailable(format!("{op}: injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl TallyStore for NullTallyStore {
    async fn apply(&self, deltas: &[TallyDelta]) -> Result<(), StoreError> {
        self.apply_attempts.fetch_add(1, Ordering::SeqCst);
        self.check("apply")?;
        let mut tallies = self.tallies.lock().unwrap();
        for delta in deltas {
            match delta {
                TallyDelta::Law { law_id, oui, non } => {
                    let row = tallies.laws.entry(law_id.clone()).or_insert((0, 0));
                    row.0 += oui;
                    row.1 += non;
                }
                TallyDelta::Candidate {
                    election_id,
                    region_id,
                    candidate_id,
                    count,
                } => {
                    *tallies
                        .candidates
                        .entry((*election_id, *region_id, *candidate_id))
                        .or_insert(0) += count;
                }
            }
        }
        self.applied_batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn totals(&self) -> Result<Vec<TallyRecord>, StoreError> {
        self.check("totals")?;
        let now = Utc::now();
        let tallies = self.tallies.lock().unwrap();
        let laws = tallies
            .laws
            .iter()
            .map(|(law_id, (oui, non))| TallyRecord::Law {
                law_id: law_id.clone(),
                oui_count: *oui,
                non_count: *non,
                total_votes: oui + non,
                updated_at: now,
            });
        let candidates = tallies.candidates.iter().map(
            |((election_id, region_id, candidate_id), count)| TallyRecord::Candidate {
                election_id: *election_id,
                region_id: *region_id,
                candidate_id: *candidate_id,
                vote_count: *count,
                updated_at: now,
            },
        );
        Ok(laws.chain(candidates).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check("ping")
    }
}
