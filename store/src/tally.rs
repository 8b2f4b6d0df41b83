//! Running tallies, the aggregator's write target.

use async_trait::async_trait;
use ballot_types::{Ballot, LawChoice, Subject};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::StoreError;

/// Increment to apply to one tally row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TallyDelta {
    Law {
        law_id: String,
        oui: i64,
        non: i64,
    },
    Candidate {
        election_id: i64,
        region_id: i64,
        candidate_id: i64,
        count: i64,
    },
}

impl TallyDelta {
    pub fn subject(&self) -> Subject {
        match self {
            Self::Law { law_id, .. } => Subject::Law(law_id.clone()),
            Self::Candidate {
                election_id,
                region_id,
                candidate_id,
                ..
            } => Subject::Candidate {
                election_id: *election_id,
                region_id: *region_id,
                candidate_id: *candidate_id,
            },
        }
    }

    /// Number of votes this delta adds.
    pub fn total(&self) -> i64 {
        match self {
            Self::Law { oui, non, .. } => oui + non,
            Self::Candidate { count, .. } => *count,
        }
    }
}

/// Group ballots by subject into one delta per row, in subject order.
///
/// Subject order is stable so concurrent flushers lock rows in the same
/// sequence.
pub fn tally_deltas<'a, I>(ballots: I) -> Vec<TallyDelta>
where
    I: IntoIterator<Item = &'a Ballot>,
{
    let mut grouped: BTreeMap<Subject, TallyDelta> = BTreeMap::new();
    for ballot in ballots {
        let entry = grouped.entry(ballot.subject());
        match ballot {
            Ballot::Law { law_id, vote } => {
                let delta = entry.or_insert_with(|| TallyDelta::Law {
                    law_id: law_id.clone(),
                    oui: 0,
                    non: 0,
                });
                if let TallyDelta::Law { oui, non, .. } = delta {
                    match vote {
                        LawChoice::Oui => *oui += 1,
                        LawChoice::Non => *non += 1,
                    }
                }
            }
            Ballot::Election {
                election_id,
                region_id,
                candidate_id,
                ..
            } => {
                let delta = entry.or_insert_with(|| TallyDelta::Candidate {
                    election_id: *election_id,
                    region_id: *region_id,
                    candidate_id: *candidate_id,
                    count: 0,
                });
                if let TallyDelta::Candidate { count, .. } = delta {
                    *count += 1;
                }
            }
        }
    }
    grouped.into_values().collect()
}

/// Current totals of one tally row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TallyRecord {
    Law {
        law_id: String,
        oui_count: i64,
        non_count: i64,
        total_votes: i64,
        updated_at: DateTime<Utc>,
    },
    Candidate {
        election_id: i64,
        region_id: i64,
        candidate_id: i64,
        vote_count: i64,
        updated_at: DateTime<Utc>,
    },
}

impl TallyRecord {
    pub fn subject(&self) -> Subject {
        match self {
            Self::Law { law_id, .. } => Subject::Law(law_id.clone()),
            Self::Candidate {
                election_id,
                region_id,
                candidate_id,
                ..
            } => Subject::Candidate {
                election_id: *election_id,
                region_id: *region_id,
                candidate_id: *candidate_id,
            },
        }
    }

    /// `(choice, count)` pairs for gauge export.
    pub fn choice_counts(&self) -> Vec<(&'static str, i64)> {
        match self {
            Self::Law {
                oui_count,
                non_count,
                ..
            } => vec![("oui", *oui_count), ("non", *non_count)],
            Self::Candidate { vote_count, .. } => vec![("votes", *vote_count)],
        }
    }
}

#[async_trait]
pub trait TallyStore: Send + Sync {
    /// Apply every delta in a single transaction: either all rows change or
    /// none do.
    async fn apply(&self, deltas: &[TallyDelta]) -> Result<(), StoreError>;

    /// Every tally row.
    async fn totals(&self) -> Result<Vec<TallyRecord>, StoreError>;

    /// Round-trip to the backend.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_subject_and_choice() {
        let ballots = vec![
            Ballot::law("L1", LawChoice::Oui),
            Ballot::law("L1", LawChoice::Oui),
            Ballot::law("L1", LawChoice::Non),
            Ballot::law("L2", LawChoice::Non),
            Ballot::election(1, 2, 3),
            Ballot::election(1, 2, 3),
            Ballot::election(1, 2, 4),
        ];
        let deltas = tally_deltas(&ballots);
        assert_eq!(
            deltas,
            vec![
                TallyDelta::Law {
                    law_id: "L1".into(),
                    oui: 2,
                    non: 1
                },
                TallyDelta::Law {
                    law_id: "L2".into(),
                    oui: 0,
                    non: 1
                },
                TallyDelta::Candidate {
                    election_id: 1,
                    region_id: 2,
                    candidate_id: 3,
                    count: 2
                },
                TallyDelta::Candidate {
                    election_id: 1,
                    region_id: 2,
                    candidate_id: 4,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn delta_totals_sum_to_batch_size() {
        let ballots = vec![
            Ballot::law("A", LawChoice::Oui),
            Ballot::law("B", LawChoice::Non),
            Ballot::election(9, 9, 9),
        ];
        let total: i64 = tally_deltas(&ballots).iter().map(TallyDelta::total).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn empty_batch_has_no_deltas() {
        assert!(tally_deltas(&Vec::<Ballot>::new()).is_empty());
    }

    #[test]
    fn law_record_exports_both_choices() {
        let record = TallyRecord::Law {
            law_id: "L".into(),
            oui_count: 4,
            non_count: 1,
            total_votes: 5,
            updated_at: Utc::now(),
        };
        assert_eq!(record.choice_counts(), vec![("oui", 4), ("non", 1)]);
    }
}
