//! Dedup/eligibility store trait.

use async_trait::async_trait;
use ballot_types::{ErrorPattern, VoterHash};

use crate::StoreError;

/// Key names shared by every key-value backend.
pub mod keys {
    use ballot_types::{ErrorPattern, VoterHash};

    /// Set of hashes provisioned as eligible.
    pub const VALID_HASHES: &str = "valid_hashes";
    /// Set of hashes whose vote has been accepted.
    pub const VOTED_HASHES: &str = "voted_hashes";
    /// Set of error patterns already routed to review.
    pub const ERROR_PATTERNS_SEEN: &str = "error_patterns_seen";

    pub fn duplicate_count(hash: &VoterHash) -> String {
        format!("duplicate_count:{hash}")
    }

    pub fn error_pattern(pattern: &ErrorPattern) -> String {
        format!("error_pattern:{pattern}")
    }
}

/// Shared key-value store: the single source of truth for "has this voter
/// already been counted".
///
/// [`mark_voted`](DedupStore::mark_voted) and
/// [`record_error_pattern`](DedupStore::record_error_pattern) must be a single
/// atomic add that reports novelty; concurrent workers rely on it as their
/// only gate.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Whether the hash is in the provisioned eligible set.
    async fn is_eligible(&self, hash: &VoterHash) -> Result<bool, StoreError>;

    /// Add the hash to the voted set. Returns `true` if it was newly added.
    async fn mark_voted(&self, hash: &VoterHash) -> Result<bool, StoreError>;

    /// Remove the hash from the voted set (compensating action).
    async fn unmark_voted(&self, hash: &VoterHash) -> Result<(), StoreError>;

    /// Whether the hash is in the voted set.
    async fn has_voted(&self, hash: &VoterHash) -> Result<bool, StoreError>;

    /// Increment the duplicate counter for a hash, returning the new value.
    async fn increment_duplicate_count(&self, hash: &VoterHash) -> Result<u64, StoreError>;

    /// Current duplicate counter for a hash (0 if never incremented).
    async fn duplicate_count(&self, hash: &VoterHash) -> Result<u64, StoreError>;

    /// Add the pattern to the seen set. Returns `true` on first sighting.
    async fn record_error_pattern(&self, pattern: &ErrorPattern) -> Result<bool, StoreError>;

    /// Remove the pattern from the seen set (compensating action).
    async fn forget_error_pattern(&self, pattern: &ErrorPattern) -> Result<(), StoreError>;

    /// Increment the repeat counter for a pattern, returning the new value.
    async fn increment_error_pattern(&self, pattern: &ErrorPattern) -> Result<u64, StoreError>;

    /// Current repeat counter for a pattern (0 if never incremented).
    async fn error_pattern_count(&self, pattern: &ErrorPattern) -> Result<u64, StoreError>;

    /// Round-trip to the backend.
    async fn ping(&self) -> Result<(), StoreError>;
}
