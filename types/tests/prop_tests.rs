use proptest::prelude::*;

use ballot_types::{Ballot, LawChoice, VoterHash, VoteStatus};

proptest! {
    /// The error pattern is always a prefix of the hash (or "unknown").
    #[test]
    fn error_pattern_is_prefix(raw in ".{0,80}", len in 1usize..16) {
        let hash = VoterHash::new(raw.clone());
        let pattern = hash.error_pattern(len);
        if raw.trim().is_empty() || raw.chars().take(len).collect::<String>().trim().is_empty() {
            prop_assert_eq!(pattern.as_str(), "unknown");
        } else {
            prop_assert!(raw.starts_with(pattern.as_str()));
            prop_assert!(pattern.as_str().chars().count() <= len);
        }
    }

    /// Hashes sharing a prefix share a pattern.
    #[test]
    fn shared_prefix_shares_pattern(prefix in "[0-9a-f]{8}", a in "[0-9a-f]{56}", b in "[0-9a-f]{56}") {
        let first = VoterHash::new(format!("{prefix}{a}"));
        let second = VoterHash::new(format!("{prefix}{b}"));
        prop_assert_eq!(first.error_pattern(8), second.error_pattern(8));
    }

    /// Derived hashes are always 64 lowercase hex characters.
    #[test]
    fn derived_hash_is_hex(nas in "[0-9]{9}", code in "[A-Z0-9]{6}") {
        let hash = VoterHash::derive(&nas, &code);
        prop_assert_eq!(hash.as_str().len(), 64);
        prop_assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    /// Election subjects are distinct per (election, region, candidate).
    #[test]
    fn election_subjects_are_distinct(e in 0i64..100, r in 0i64..100, c1 in 0i64..100, c2 in 0i64..100) {
        let a = Ballot::election(e, r, c1).subject();
        let b = Ballot::election(e, r, c2).subject();
        prop_assert_eq!(a == b, c1 == c2);
    }
}

#[test]
fn status_round_trips_through_str() {
    for status in [VoteStatus::Validated, VoteStatus::Duplicate, VoteStatus::Invalid] {
        assert_eq!(status.as_str().parse::<VoteStatus>(), Ok(status));
    }
}

#[test]
fn law_choice_display_is_lowercase() {
    assert_eq!(LawChoice::Oui.to_string(), "oui");
}
