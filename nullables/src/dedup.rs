//! Nullable dedup store: the Redis sets and counters, in memory.

use async_trait::async_trait;
use ballot_store::{DedupStore, StoreError};
use ballot_types::{ErrorPattern, VoterHash};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::FailureSwitch;

#[derive(Default)]
struct State {
    valid: HashSet<String>,
    voted: HashSet<String>,
    duplicate_counts: HashMap<String, u64>,
    patterns_seen: HashSet<String>,
    pattern_counts: HashMap<String, u64>,
}

/// In-memory [`DedupStore`]. Thread-safe for tokio's multi-threaded runtime.
///
/// Call [`fail_operation`](Self::fail_operation) with a trait method name
/// (or `"*"`) to make that operation return [`StoreError::Unavailable`].
#[derive(Default)]
pub struct NullDedupStore {
    state: Mutex<State>,
    failures: FailureSwitch,
    calls: Mutex<Vec<&'static str>>,
}

impl NullDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with the given hashes provisioned as eligible.
    pub fn with_eligible<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for hash in hashes {
            store.add_eligible(hash);
        }
        store
    }

    pub fn add_eligible(&self, hash: impl Into<String>) {
        self.state.lock().unwrap().valid.insert(hash.into());
    }

    pub fn fail_operation(&self, op: &str) {
        self.failures.fail(op);
    }

    pub fn heal_operation(&self, op: &str) {
        self.failures.heal(op);
    }

    pub fn heal_all(&self) {
        self.failures.heal_all();
    }

    /// Hashes currently in the voted set.
    pub fn voted(&self) -> HashSet<String> {
        self.state.lock().unwrap().voted.clone()
    }

    /// Patterns currently in the seen set.
    pub fn patterns_seen(&self) -> HashSet<String> {
        self.state.lock().unwrap().patterns_seen.clone()
    }

    /// Every operation invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(&self, op: &'static str) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(op);
        if self.failures.is_failing(op) {
            return Err(StoreError::Unavailable(format!("{op}: injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl DedupStore for NullDedupStore {
    async fn is_eligible(&self, hash: &VoterHash) -> Result<bool, StoreError> {
        self.enter("is_eligible")?;
        Ok(self.state.lock().unwrap().valid.contains(hash.as_str()))
    }

    async fn mark_voted(&self, hash: &VoterHash) -> Result<bool, StoreError> {
        self.enter("mark_voted")?;
        Ok(self.state.lock().unwrap().voted.insert(hash.to_string()))
    }

    async fn unmark_voted(&self, hash: &VoterHash) -> Result<(), StoreError> {
        self.enter("unmark_voted")?;
        self.state.lock().unwrap().voted.remove(hash.as_str());
        Ok(())
    }

    async fn has_voted(&self, hash: &VoterHash) -> Result<bool, StoreError> {
        self.enter("has_voted")?;
        Ok(self.state.lock().unwrap().voted.contains(hash.as_str()))
    }

    async fn increment_duplicate_count(&self, hash: &VoterHash) -> Result<u64, StoreError> {
        self.enter("increment_duplicate_count")?;
        let mut state = self.state.lock().unwrap();
        let count = state.duplicate_counts.entry(hash.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn duplicate_count(&self, hash: &VoterHash) -> Result<u64, StoreError> {
        self.enter("duplicate_count")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .duplicate_counts
            .get(hash.as_str())
            .copied()
            .unwrap_or(0))
    }

    async fn record_error_pattern(&self, pattern: &ErrorPattern) -> Result<bool, StoreError> {
        self.enter("record_error_pattern")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .patterns_seen
            .insert(pattern.to_string()))
    }

    async fn forget_error_pattern(&self, pattern: &ErrorPattern) -> Result<(), StoreError> {
        self.enter("forget_error_pattern")?;
        self.state
            .lock()
            .unwrap()
            .patterns_seen
            .remove(pattern.as_str());
        Ok(())
    }

    async fn increment_error_pattern(&self, pattern: &ErrorPattern) -> Result<u64, StoreError> {
        self.enter("increment_error_pattern")?;
        let mut state = self.state.lock().unwrap();
        let count = state.pattern_counts.entry(pattern.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn error_pattern_count(&self, pattern: &ErrorPattern) -> Result<u64, StoreError> {
        self.enter("error_pattern_count")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .pattern_counts
            .get(pattern.as_str())
            .copied()
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.enter("ping")
    }
}
