//! Validation worker behaviour against in-memory stores and broker.

use ballot_messages::{AcceptedVote, ReviewEntry};
use ballot_nullables::{NullAuditStore, NullBroker, NullDedupStore};
use ballot_queue::Disposition;
use ballot_store::DedupStore;
use ballot_types::{Ballot, ErrorPattern, LawChoice, VoteStatus, VoterHash};
use ballot_validator::{
    Outcome, ValidationWorker, ValidatorConfig, ValidatorError, ValidatorMetrics,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const VALIDATION: &str = "votes.validation";
const AGGREGATION: &str = "votes.aggregation";
const REVIEW: &str = "votes.review";

struct Harness {
    worker: ValidationWorker,
    dedup: Arc<NullDedupStore>,
    audit: Arc<NullAuditStore>,
    broker: NullBroker,
}

fn test_config() -> ValidatorConfig {
    ValidatorConfig {
        worker_id: "validator-test".into(),
        publish_retry_delay_ms: 1,
        queue_depth_interval_ms: 10,
        ..Default::default()
    }
}

fn harness_with(config: ValidatorConfig, eligible: &[&str]) -> Harness {
    let dedup = Arc::new(NullDedupStore::with_eligible(eligible.iter().copied()));
    let audit = Arc::new(NullAuditStore::new());
    let broker = NullBroker::new();
    let worker = ValidationWorker::new(
        config,
        dedup.clone(),
        audit.clone(),
        Arc::new(broker.clone()),
        Arc::new(ValidatorMetrics::new()),
    );
    Harness {
        worker,
        dedup,
        audit,
        broker,
    }
}

fn harness(eligible: &[&str]) -> Harness {
    harness_with(test_config(), eligible)
}

fn law_vote(hash: &str, law_id: &str, vote: &str) -> Vec<u8> {
    format!(
        r#"{{"hash":"{hash}","law_id":"{law_id}","vote":"{vote}","vote_timestamp":"2024-05-01T12:00:00"}}"#
    )
    .into_bytes()
}

fn statuses(audit: &NullAuditStore, hash: &str) -> Vec<VoteStatus> {
    audit.records_for(hash).iter().map(|r| r.status).collect()
}

#[tokio::test]
async fn repeated_submission_counts_once() {
    let h = harness(&["H1", "H2", "H3", "H4", "H5"]);
    let body = law_vote("H1", "LAW-1", "oui");

    let first = h.worker.handle(&body).await;
    let second = h.worker.handle(&body).await;
    let third = h.worker.handle(&body).await;

    assert_eq!(first.outcome, Outcome::Accepted);
    assert_eq!(second.outcome, Outcome::Duplicate { attempt: 1 });
    assert_eq!(third.outcome, Outcome::Duplicate { attempt: 2 });
    assert!([&first, &second, &third]
        .iter()
        .all(|v| v.disposition == Disposition::Ack));

    assert_eq!(
        statuses(&h.audit, "H1"),
        vec![VoteStatus::Validated, VoteStatus::Duplicate, VoteStatus::Duplicate]
    );
    let hash = VoterHash::new("H1");
    assert_eq!(h.dedup.duplicate_count(&hash).await.unwrap(), 2);
    assert_eq!(h.audit.duplicate_attempts("H1").unwrap().attempt_count, 2);
    assert_eq!(h.broker.published(AGGREGATION).len(), 1);
    assert_eq!(h.worker.metrics().duplicate_attempts.get(), 2);
}

#[tokio::test]
async fn distinct_eligible_hashes_all_accepted() {
    let hashes = ["A1", "A2", "A3", "A4", "A5"];
    let h = harness(&hashes);

    for hash in hashes {
        let verdict = h.worker.handle(&law_vote(hash, "LAW-7", "non")).await;
        assert_eq!(verdict.outcome, Outcome::Accepted);
    }

    assert_eq!(h.broker.published(AGGREGATION).len(), hashes.len());
    assert_eq!(h.audit.count_with_status(VoteStatus::Validated), hashes.len());
    for hash in hashes {
        let count = h.dedup.duplicate_count(&VoterHash::new(hash)).await.unwrap();
        assert_eq!(count, 0);
    }
    assert_eq!(h.worker.metrics().processed("validated"), hashes.len() as u64);
}

#[tokio::test]
async fn accepted_vote_carries_subject_and_status() {
    let h = harness(&["abc123"]);
    h.worker.handle(&law_vote("abc123", "LAW-1", "OUI")).await;

    let published = h.broker.published(AGGREGATION);
    let vote = AcceptedVote::from_slice(&published[0]).unwrap();
    assert_eq!(vote.voter_hash.as_str(), "abc123");
    assert_eq!(vote.ballot, Ballot::law("LAW-1", LawChoice::Oui));

    let record = &h.audit.records_for("abc123")[0];
    assert_eq!(record.metadata["worker_id"], "validator-test");
    assert!(record.metadata.get("validation_timestamp").is_some());
}

#[tokio::test]
async fn election_vote_keeps_ranking_in_audit_metadata() {
    let h = harness(&["e-voter"]);
    let body = br#"{"hash":"e-voter","election_id":2,"region_id":5,"candidate_id":11,
        "ranked_choices":[11,4],"vote_timestamp":"2024-05-01T12:00:00Z"}"#;

    let verdict = h.worker.handle(body).await;
    assert_eq!(verdict.outcome, Outcome::Accepted);

    let record = &h.audit.records_for("e-voter")[0];
    assert_eq!(record.choice, "11");
    assert_eq!(record.metadata["kind"], "election");
    assert_eq!(record.metadata["ranked_choices"], serde_json::json!([11, 4]));

    let vote = AcceptedVote::from_slice(&h.broker.published(AGGREGATION)[0]).unwrap();
    assert_eq!(vote.ballot.subject(), Ballot::election(2, 5, 11).subject());
}

#[tokio::test]
async fn invalid_hashes_sharing_a_prefix_produce_one_review_entry() {
    let h = harness(&[]);
    let m = 6;
    for i in 0..m {
        let verdict = h
            .worker
            .handle(&law_vote(&format!("deadbeef{i:04}"), "LAW-1", "oui"))
            .await;
        assert_eq!(verdict.disposition, Disposition::Ack);
    }

    assert_eq!(h.broker.published(REVIEW).len(), 1);
    let pattern = ErrorPattern::new("deadbeef");
    assert_eq!(h.dedup.error_pattern_count(&pattern).await.unwrap(), m - 1);
    assert_eq!(h.audit.count_with_status(VoteStatus::Invalid), 1);
    assert_eq!(h.worker.metrics().error_patterns_unique.get(), 1);
    assert_eq!(h.worker.metrics().error_patterns_repeated.get(), m - 1);
    assert!(h.broker.published(AGGREGATION).is_empty());
}

#[tokio::test]
async fn single_ineligible_hash_is_audited_and_reviewed() {
    let h = harness(&["someone-else"]);
    let verdict = h.worker.handle(&law_vote("ffff0000aaaa", "LAW-2", "non")).await;

    assert_eq!(
        verdict.outcome,
        Outcome::Ineligible {
            pattern: ErrorPattern::new("ffff0000"),
            first_sighting: true,
        }
    );
    assert_eq!(statuses(&h.audit, "ffff0000aaaa"), vec![VoteStatus::Invalid]);
    assert_eq!(
        h.audit.records_for("ffff0000aaaa")[0].metadata["error_pattern"],
        "ffff0000"
    );

    let review = ReviewEntry::from_slice(&h.broker.published(REVIEW)[0]).unwrap();
    assert_eq!(review.error_pattern, Some(ErrorPattern::new("ffff0000")));
    assert_eq!(review.reason, ballot_messages::review::REASON_NOT_ELIGIBLE);
    assert!(h.broker.published(AGGREGATION).is_empty());
}

#[tokio::test]
async fn oversized_payload_is_rejected_before_parsing() {
    let h = harness(&["H1"]);
    let body = vec![b'x'; 2048];

    let verdict = h.worker.handle(&body).await;

    assert_eq!(verdict.outcome, Outcome::Oversized { bytes: 2048 });
    assert_eq!(verdict.disposition, Disposition::Reject);
    assert!(h.audit.records().is_empty());
    assert!(h.dedup.calls().is_empty());
    assert_eq!(h.worker.metrics().oversized_payloads.get(), 1);
    assert_eq!(h.worker.metrics().processed("invalid"), 0);
    assert_eq!(h.worker.metrics().processed("duplicate"), 0);
}

#[tokio::test]
async fn payload_at_the_ceiling_is_still_parsed() {
    let h = harness(&["H1"]);
    let mut body = law_vote("H1", "LAW-1", "oui");
    // Pad with whitespace inside the JSON object up to exactly the limit.
    let pad = 1024 - body.len();
    body.splice(1..1, std::iter::repeat(b' ').take(pad));
    assert_eq!(body.len(), 1024);

    let verdict = h.worker.handle(&body).await;
    assert_eq!(verdict.outcome, Outcome::Accepted);
}

#[tokio::test]
async fn malformed_and_incomplete_payloads_are_rejected() {
    let h = harness(&["H1"]);

    let malformed = h.worker.handle(b"{not json").await;
    assert_eq!(malformed.outcome, Outcome::Malformed);
    assert_eq!(malformed.disposition, Disposition::Reject);

    let incomplete = h
        .worker
        .handle(br#"{"hash":"H1","vote":"oui","vote_timestamp":"2024-05-01T12:00:00Z"}"#)
        .await;
    assert_eq!(incomplete.outcome, Outcome::InvalidFormat);
    assert_eq!(incomplete.disposition, Disposition::Reject);

    let bad_choice = h.worker.handle(&law_vote("H1", "LAW-1", "maybe")).await;
    assert_eq!(bad_choice.outcome, Outcome::InvalidFormat);

    assert!(h.dedup.calls().is_empty());
    assert!(h.audit.records().is_empty());
    let errors = &h.worker.metrics().validation_errors;
    assert_eq!(errors.with_label_values(&["malformed"]).get(), 1);
    assert_eq!(errors.with_label_values(&["invalid_format"]).get(), 2);
}

#[tokio::test]
async fn store_outage_requeues_without_side_effects() {
    let h = harness(&["H1"]);
    h.dedup.fail_operation("is_eligible");

    let verdict = h.worker.handle(&law_vote("H1", "LAW-1", "oui")).await;

    assert_eq!(verdict.outcome, Outcome::Retry);
    assert_eq!(verdict.disposition, Disposition::Requeue);
    assert!(h.dedup.voted().is_empty());
    assert!(h.audit.records().is_empty());
}

#[tokio::test]
async fn audit_failure_rolls_back_voted_marker_and_requeues() {
    let h = harness(&["H1"]);
    h.audit.fail_operation("append");

    let verdict = h.worker.handle(&law_vote("H1", "LAW-1", "oui")).await;
    assert_eq!(verdict.disposition, Disposition::Requeue);
    assert!(h.dedup.voted().is_empty(), "marker must be rolled back");
    assert!(h.broker.published(AGGREGATION).is_empty());

    // The retry is treated as a first sighting.
    h.audit.heal_all();
    let retry = h.worker.handle(&law_vote("H1", "LAW-1", "oui")).await;
    assert_eq!(retry.outcome, Outcome::Accepted);
    assert_eq!(statuses(&h.audit, "H1"), vec![VoteStatus::Validated]);
}

#[tokio::test]
async fn failed_rollback_rejects_and_flags_for_review() {
    let h = harness(&["H1"]);
    h.audit.fail_operation("append");
    h.dedup.fail_operation("unmark_voted");

    let verdict = h.worker.handle(&law_vote("H1", "LAW-1", "oui")).await;

    assert_eq!(verdict.outcome, Outcome::CompensationFailed);
    assert_eq!(verdict.disposition, Disposition::Reject);
    assert_eq!(h.worker.metrics().compensation_failures.get(), 1);
    let review = ReviewEntry::from_slice(&h.broker.published(REVIEW)[0]).unwrap();
    assert_eq!(
        review.reason,
        ballot_messages::review::REASON_COMPENSATION_FAILED
    );
    assert!(h.broker.published(AGGREGATION).is_empty());
}

#[tokio::test]
async fn transient_publish_failures_are_retried() {
    let h = harness(&["H1"]);
    h.broker.fail_publishes(AGGREGATION, 2);

    let verdict = h.worker.handle(&law_vote("H1", "LAW-1", "oui")).await;

    assert_eq!(verdict.outcome, Outcome::Accepted);
    assert_eq!(h.broker.published(AGGREGATION).len(), 1);
}

#[tokio::test]
async fn exhausted_publish_retries_ack_and_flag_without_a_duplicate() {
    let h = harness(&["H1"]);
    h.broker.fail_publishes(AGGREGATION, 10);

    let verdict = h.worker.handle(&law_vote("H1", "LAW-1", "oui")).await;

    assert_eq!(verdict.outcome, Outcome::PublishFailed);
    assert_eq!(verdict.disposition, Disposition::Ack);
    assert_eq!(statuses(&h.audit, "H1"), vec![VoteStatus::Validated]);
    assert_eq!(
        h.dedup.duplicate_count(&VoterHash::new("H1")).await.unwrap(),
        0
    );
    assert!(h.audit.duplicate_attempts("H1").is_none());
    assert!(h.broker.published(AGGREGATION).is_empty());

    let review = ReviewEntry::from_slice(&h.broker.published(REVIEW)[0]).unwrap();
    assert_eq!(review.reason, ballot_messages::review::REASON_PUBLISH_FAILED);
    assert_eq!(review.voter_hash, VoterHash::new("H1"));
}

#[tokio::test]
async fn review_publish_failure_keeps_pattern_unseen() {
    let h = harness(&[]);
    h.broker.fail_publishes(REVIEW, 10);

    let verdict = h.worker.handle(&law_vote("cafebabe01", "LAW-1", "oui")).await;
    assert_eq!(verdict.disposition, Disposition::Requeue);
    assert!(h.dedup.patterns_seen().is_empty());
    assert!(h.audit.records_for("cafebabe01").is_empty());

    h.broker.fail_publishes(REVIEW, 0);
    let retry = h.worker.handle(&law_vote("cafebabe01", "LAW-1", "oui")).await;
    assert_eq!(
        retry.outcome,
        Outcome::Ineligible {
            pattern: ErrorPattern::new("cafebabe"),
            first_sighting: true,
        }
    );
    assert_eq!(h.broker.published(REVIEW).len(), 1);
    assert_eq!(statuses(&h.audit, "cafebabe01"), vec![VoteStatus::Invalid]);
}

#[tokio::test]
async fn racing_workers_accept_a_hash_once() {
    let dedup = Arc::new(NullDedupStore::with_eligible(["H1"]));
    let audit = Arc::new(NullAuditStore::new());
    let broker = NullBroker::new();
    let make = || {
        ValidationWorker::new(
            test_config(),
            dedup.clone(),
            audit.clone(),
            Arc::new(broker.clone()),
            Arc::new(ValidatorMetrics::new()),
        )
    };
    let (a, b) = (make(), make());
    let body = law_vote("H1", "LAW-1", "oui");

    let (va, vb) = tokio::join!(a.handle(&body), b.handle(&body));

    let accepted = [&va, &vb]
        .iter()
        .filter(|v| v.outcome == Outcome::Accepted)
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(broker.published(AGGREGATION).len(), 1);
    assert_eq!(audit.count_with_status(VoteStatus::Validated), 1);
}

#[tokio::test]
async fn run_settles_deliveries_and_stops_on_shutdown() {
    let h = harness(&["H1", "H2"]);
    h.broker.inject(VALIDATION, law_vote("H1", "LAW-1", "oui"));
    h.broker.inject(VALIDATION, law_vote("H1", "LAW-1", "oui"));
    h.broker.inject(VALIDATION, b"garbage".to_vec());
    h.broker.inject(VALIDATION, law_vote("H2", "LAW-1", "non"));

    let broker = h.broker.clone();
    let worker = Arc::new(h.worker);
    let (tx, rx) = broadcast::channel(1);
    let task = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run(rx).await }
    });

    assert!(broker.wait_for_settlements(4, Duration::from_secs(5)).await);
    tx.send(()).unwrap();
    task.await.unwrap().expect("worker should stop cleanly");

    assert_eq!(broker.settlements_with(Disposition::Ack), 3);
    assert_eq!(broker.settlements_with(Disposition::Reject), 1);
    assert_eq!(broker.published(AGGREGATION).len(), 2);
    assert_eq!(broker.declared().len(), 3);
    assert!(broker.is_closed());
}

#[tokio::test]
async fn requeued_delivery_is_retried_by_the_loop() {
    let h = harness(&["H1"]);
    h.dedup.fail_operation("is_eligible");
    h.broker.inject(VALIDATION, law_vote("H1", "LAW-1", "oui"));

    let broker = h.broker.clone();
    let dedup = h.dedup.clone();
    let worker = Arc::new(h.worker);
    let (tx, rx) = broadcast::channel(1);
    let task = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run(rx).await }
    });

    assert!(broker.wait_for_settlements(1, Duration::from_secs(5)).await);
    dedup.heal_all();
    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.settlements_with(Disposition::Ack) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("redelivery should eventually be acked");
    tx.send(()).unwrap();
    task.await.unwrap().unwrap();

    let settlements = broker.settlements();
    assert_eq!(settlements[0].disposition, Disposition::Requeue);
    assert_eq!(settlements.last().unwrap().disposition, Disposition::Ack);
    assert_eq!(broker.settlements_with(Disposition::Ack), 1);
    assert!(dedup.voted().contains("H1"));
}

#[tokio::test]
async fn repeated_compensation_failure_stops_the_worker() {
    let config = ValidatorConfig {
        compensation_failure_threshold: 2,
        ..test_config()
    };
    let h = harness_with(config, &["H1", "H2", "H3"]);
    h.audit.fail_operation("append");
    h.dedup.fail_operation("unmark_voted");
    for hash in ["H1", "H2", "H3"] {
        h.broker.inject(VALIDATION, law_vote(hash, "LAW-1", "oui"));
    }

    let (_tx, rx) = broadcast::channel(1);
    let result = tokio::time::timeout(Duration::from_secs(5), h.worker.run(rx))
        .await
        .expect("worker should stop on its own");

    assert!(matches!(result, Err(ValidatorError::CompensationThreshold(2))));
    assert_eq!(h.broker.settlements_with(Disposition::Reject), 2);
    assert!(h.broker.is_closed());
}

#[tokio::test]
async fn queue_depth_gauge_tracks_backlog() {
    let h = harness(&[]);
    let (tx, rx) = broadcast::channel(1);
    let broker = h.broker.clone();
    let worker = Arc::new(h.worker);
    let task = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run(rx).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(worker.metrics().validation_queue_size.get(), 0);
    assert!(broker.is_closed());
}
