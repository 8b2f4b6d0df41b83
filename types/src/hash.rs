//! Voter identity hashes and the error patterns derived from them.
//!
//! Downstream of ingestion a voter is known only by an opaque hash string.
//! The pipeline never interprets its contents beyond taking a short prefix
//! to group ineligible submissions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of leading characters used to group ineligible hashes.
pub const DEFAULT_PATTERN_LEN: usize = 8;

/// The sole voter identifier downstream of ingestion.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterHash(String);

impl VoterHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive the hash the ingestion layer computes: hex SHA-256 of the
    /// NAS followed by the verification code.
    pub fn derive(nas: &str, code: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(nas.as_bytes());
        hasher.update(code.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Grouping key for an ineligible hash: its first `len` characters.
    pub fn error_pattern(&self, len: usize) -> ErrorPattern {
        let prefix: String = self.0.chars().take(len).collect();
        if prefix.trim().is_empty() {
            ErrorPattern::unknown()
        } else {
            ErrorPattern(prefix)
        }
    }
}

impl fmt::Debug for VoterHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(12).collect();
        write!(f, "VoterHash({short})")
    }
}

impl fmt::Display for VoterHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VoterHash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Prefix of an ineligible hash, used to collapse bursts of similar garbage
/// into a single review entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorPattern(String);

impl ErrorPattern {
    const UNKNOWN: &'static str = "unknown";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic_hex_sha256() {
        let hash = VoterHash::derive("123456789", "ABC123");
        assert_eq!(hash.as_str().len(), 64);
        assert_eq!(hash, VoterHash::derive("123456789", "ABC123"));
        assert_ne!(hash, VoterHash::derive("123456789", "ABC124"));
    }

    #[test]
    fn error_pattern_takes_prefix() {
        let hash = VoterHash::new("deadbeefcafebabe");
        assert_eq!(hash.error_pattern(8).as_str(), "deadbeef");
    }

    #[test]
    fn short_hash_is_its_own_pattern() {
        let hash = VoterHash::new("abc");
        assert_eq!(hash.error_pattern(8).as_str(), "abc");
    }

    #[test]
    fn empty_hash_maps_to_unknown_pattern() {
        assert_eq!(VoterHash::new("").error_pattern(8), ErrorPattern::unknown());
        assert_eq!(VoterHash::new("   ").error_pattern(8), ErrorPattern::unknown());
    }

    #[test]
    fn pattern_respects_char_boundaries() {
        let hash = VoterHash::new("éééééééééé");
        assert_eq!(hash.error_pattern(3).as_str(), "ééé");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&VoterHash::new("h1")).unwrap();
        assert_eq!(json, "\"h1\"");
    }
}
