//! The per-message validation state machine and its consume loop.
//!
//! ```text
//! RECEIVED → size check ─ OVERSIZED (reject)
//!          → parse ────── MALFORMED (reject)
//!          → field check ─ INVALID_FORMAT (reject)
//!          → eligibility ─ NOT_ELIGIBLE → pattern handling (ack)
//!          → mark voted ── DUPLICATE → count and drop (ack)
//!          → audit insert → publish aggregation → ACCEPTED (ack)
//! ```
//!
//! Store or broker failures before the audit commit requeue the message. When
//! the audit insert fails after the hash was marked voted, the mark is rolled
//! back first so the retry sees the vote as new. After the commit nothing is
//! requeued: an unforwarded vote is acked and flagged for review.

use ballot_messages::{AcceptedVote, ReviewEntry, VoteEvent};
use ballot_queue::{Broker, Disposition, QueueError};
use ballot_store::{AuditRecord, AuditStore, DedupStore, StoreError};
use ballot_types::{ErrorPattern, VoteStatus};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{ValidatorConfig, ValidatorError, ValidatorMetrics};

/// What happened to one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Duplicate { attempt: u64 },
    Ineligible {
        pattern: ErrorPattern,
        first_sighting: bool,
    },
    Oversized { bytes: usize },
    Malformed,
    InvalidFormat,
    /// Transient failure; the message goes back to the queue.
    Retry,
    /// Audit insert and voted-marker rollback both failed.
    CompensationFailed,
    /// Audited but never forwarded; flagged for a tally rebuild.
    PublishFailed,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "validated",
            Self::Duplicate { .. } => "duplicate",
            Self::Ineligible { .. } => "invalid",
            Self::Oversized { .. } => "oversized",
            Self::Malformed => "malformed",
            Self::InvalidFormat => "invalid_format",
            Self::Retry => "retry",
            Self::CompensationFailed => "compensation_failed",
            Self::PublishFailed => "publish_failed",
        }
    }
}

/// Outcome plus how the delivery must be settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: Outcome,
    pub disposition: Disposition,
}

impl Verdict {
    fn new(outcome: Outcome, disposition: Disposition) -> Self {
        Self {
            outcome,
            disposition,
        }
    }
}

pub struct ValidationWorker {
    config: ValidatorConfig,
    dedup: Arc<dyn DedupStore>,
    audit: Arc<dyn AuditStore>,
    broker: Arc<dyn Broker>,
    metrics: Arc<ValidatorMetrics>,
    consecutive_compensation_failures: AtomicU32,
}

impl ValidationWorker {
    pub fn new(
        config: ValidatorConfig,
        dedup: Arc<dyn DedupStore>,
        audit: Arc<dyn AuditStore>,
        broker: Arc<dyn Broker>,
        metrics: Arc<ValidatorMetrics>,
    ) -> Self {
        Self {
            config,
            dedup,
            audit,
            broker,
            metrics,
            consecutive_compensation_failures: AtomicU32::new(0),
        }
    }

    pub fn metrics(&self) -> &ValidatorMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Process one raw payload and decide how to settle it.
    pub async fn handle(&self, body: &[u8]) -> Verdict {
        let timer = self.metrics.validation_seconds.start_timer();
        let verdict = self.process(body).await;
        timer.observe_duration();
        self.metrics
            .votes_processed
            .with_label_values(&[verdict.outcome.label()])
            .inc();
        verdict
    }

    async fn process(&self, body: &[u8]) -> Verdict {
        if body.len() > self.config.max_payload_bytes {
            self.metrics.oversized_payloads.inc();
            warn!(
                bytes = body.len(),
                limit = self.config.max_payload_bytes,
                "oversized payload rejected"
            );
            return Verdict::new(Outcome::Oversized { bytes: body.len() }, Disposition::Reject);
        }

        let event = match VoteEvent::decode(body) {
            Ok(event) => event,
            Err(e) if e.is_malformed() => {
                self.count_error("malformed");
                warn!(error = %e, "malformed payload rejected");
                return Verdict::new(Outcome::Malformed, Disposition::Reject);
            }
            Err(e) => {
                self.count_error("invalid_format");
                warn!(error = %e, "payload failed field check");
                return Verdict::new(Outcome::InvalidFormat, Disposition::Reject);
            }
        };

        match self.validate(&event).await {
            Ok(verdict) => verdict,
            Err(e) => {
                self.count_error("transient");
                error!(hash = ?event.hash, error = %e, "processing failed, requeueing");
                Verdict::new(Outcome::Retry, Disposition::Requeue)
            }
        }
    }

    async fn validate(&self, event: &VoteEvent) -> Result<Verdict, ValidatorError> {
        let eligible = self
            .timed("dedup", "is_eligible", self.dedup.is_eligible(&event.hash))
            .await?;
        if !eligible {
            return self.handle_ineligible(event).await;
        }

        // Atomic add-and-report: the only gate between concurrent workers.
        let newly_marked = self
            .timed("dedup", "mark_voted", self.dedup.mark_voted(&event.hash))
            .await?;
        if !newly_marked {
            return self.handle_duplicate(event).await;
        }

        self.accept(event).await
    }

    async fn handle_ineligible(&self, event: &VoteEvent) -> Result<Verdict, ValidatorError> {
        let pattern = event.hash.error_pattern(self.config.error_pattern_len);
        let first_sighting = self
            .timed(
                "dedup",
                "record_error_pattern",
                self.dedup.record_error_pattern(&pattern),
            )
            .await?;

        if !first_sighting {
            let repeats = self
                .timed(
                    "dedup",
                    "increment_error_pattern",
                    self.dedup.increment_error_pattern(&pattern),
                )
                .await?;
            self.metrics.error_patterns_repeated.inc();
            debug!(pattern = %pattern, repeats, "known error pattern");
            return Ok(Verdict::new(
                Outcome::Ineligible {
                    pattern,
                    first_sighting: false,
                },
                Disposition::Ack,
            ));
        }

        if let Err(e) = self.report_new_pattern(event, &pattern).await {
            // Un-see the pattern so the redelivery reports it again.
            if let Err(undo) = self.dedup.forget_error_pattern(&pattern).await {
                error!(pattern = %pattern, error = %undo, "failed to forget error pattern");
            }
            return Err(e);
        }

        self.metrics.error_patterns_unique.inc();
        info!(pattern = %pattern, hash = ?event.hash, "new error pattern sent to review");
        Ok(Verdict::new(
            Outcome::Ineligible {
                pattern,
                first_sighting: true,
            },
            Disposition::Ack,
        ))
    }

    async fn report_new_pattern(
        &self,
        event: &VoteEvent,
        pattern: &ErrorPattern,
    ) -> Result<(), ValidatorError> {
        let now = Utc::now();
        let entry = ReviewEntry::not_eligible(event, pattern.clone(), now);
        self.publish(&self.config.queues.review_queue, &entry.to_json_bytes()?)
            .await?;

        let mut metadata = self.audit_metadata(now);
        metadata["error_pattern"] = serde_json::Value::String(pattern.to_string());
        let record = AuditRecord::new(
            &event.hash,
            &event.ballot,
            VoteStatus::Invalid,
            event.vote_timestamp,
            now,
            metadata,
        );
        self.timed("audit", "append", self.audit.append(&record))
            .await?;
        Ok(())
    }

    async fn handle_duplicate(&self, event: &VoteEvent) -> Result<Verdict, ValidatorError> {
        let now = Utc::now();
        let record = AuditRecord::new(
            &event.hash,
            &event.ballot,
            VoteStatus::Duplicate,
            event.vote_timestamp,
            now,
            self.audit_metadata(now),
        );
        self.timed("audit", "append", self.audit.append(&record))
            .await?;
        self.metrics.duplicate_attempts.inc();

        // Counters are cheap signals; a failure here must not replay the
        // audit row.
        let attempt = match self
            .timed(
                "dedup",
                "increment_duplicate_count",
                self.dedup.increment_duplicate_count(&event.hash),
            )
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(hash = ?event.hash, error = %e, "failed to bump duplicate counter");
                0
            }
        };
        if let Err(e) = self
            .timed(
                "audit",
                "record_duplicate_attempt",
                self.audit.record_duplicate_attempt(&event.hash, now),
            )
            .await
        {
            warn!(hash = ?event.hash, error = %e, "failed to record duplicate attempt");
        }

        info!(hash = ?event.hash, attempt, "duplicate vote dropped");
        Ok(Verdict::new(Outcome::Duplicate { attempt }, Disposition::Ack))
    }

    async fn accept(&self, event: &VoteEvent) -> Result<Verdict, ValidatorError> {
        let now = Utc::now();
        let record = AuditRecord::new(
            &event.hash,
            &event.ballot,
            VoteStatus::Validated,
            event.vote_timestamp,
            now,
            self.audit_metadata(now),
        );

        if let Err(audit_err) = self
            .timed("audit", "append", self.audit.append(&record))
            .await
        {
            warn!(hash = ?event.hash, error = %audit_err, "audit insert failed, rolling back voted marker");
            return match self
                .timed("dedup", "unmark_voted", self.dedup.unmark_voted(&event.hash))
                .await
            {
                Ok(()) => {
                    self.consecutive_compensation_failures
                        .store(0, Ordering::SeqCst);
                    Err(audit_err.into())
                }
                Err(undo_err) => Ok(self.compensation_failed(event, audit_err, undo_err).await),
            };
        }
        self.consecutive_compensation_failures
            .store(0, Ordering::SeqCst);

        // Past the audit commit a redelivery would read as a duplicate, so
        // the message is never requeued from here on.
        let accepted = AcceptedVote::from_event(event, now);
        if let Err(e) = self
            .publish(
                &self.config.queues.aggregation_queue,
                &accepted.to_json_bytes()?,
            )
            .await
        {
            self.count_error("publish_failed");
            error!(
                hash = ?event.hash,
                error = %e,
                "accepted vote not forwarded, tallies need a rebuild"
            );
            self.flag_for_review(&ReviewEntry::publish_failed(event, Utc::now()))
                .await;
            return Ok(Verdict::new(Outcome::PublishFailed, Disposition::Ack));
        }

        info!(
            hash = ?event.hash,
            subject = %event.ballot.subject(),
            choice = %event.ballot.choice_label(),
            "vote validated"
        );
        Ok(Verdict::new(Outcome::Accepted, Disposition::Ack))
    }

    /// The hash stays in the voted set without an audit row. Drop the
    /// message rather than retry against an inconsistent store, and flag it
    /// for operators.
    async fn compensation_failed(
        &self,
        event: &VoteEvent,
        audit_err: StoreError,
        undo_err: StoreError,
    ) -> Verdict {
        let consecutive = self
            .consecutive_compensation_failures
            .fetch_add(1, Ordering::SeqCst)
            + 1;
        self.metrics.compensation_failures.inc();
        error!(
            hash = ?event.hash,
            audit_error = %audit_err,
            rollback_error = %undo_err,
            consecutive,
            "voted marker left set without an audit row"
        );

        self.flag_for_review(&ReviewEntry::compensation_failed(event, Utc::now()))
            .await;
        Verdict::new(Outcome::CompensationFailed, Disposition::Reject)
    }

    /// Best-effort review publish; failures are logged only.
    async fn flag_for_review(&self, entry: &ReviewEntry) {
        let bytes = match entry.to_json_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "failed to encode review entry");
                return;
            }
        };
        if let Err(e) = self
            .publish(&self.config.queues.review_queue, &bytes)
            .await
        {
            error!(
                hash = ?entry.voter_hash,
                reason = %entry.reason,
                error = %e,
                "failed to flag vote for review"
            );
        }
    }

    /// Publish with bounded retries.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        let mut attempt = 0;
        loop {
            match self.broker.publish(queue, payload).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.publish_retries => {
                    attempt += 1;
                    warn!(queue, attempt, error = %e, "publish failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.publish_retry_delay_ms))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn timed<T, F>(&self, store: &str, operation: &str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timer = self
            .metrics
            .store_operation_seconds
            .with_label_values(&[store, operation])
            .start_timer();
        let result = call.await;
        timer.observe_duration();
        result
    }

    fn audit_metadata(&self, now: DateTime<Utc>) -> serde_json::Value {
        serde_json::json!({
            "worker_id": self.config.worker_id,
            "validation_timestamp": now.to_rfc3339(),
        })
    }

    fn count_error(&self, error_type: &str) {
        self.metrics
            .validation_errors
            .with_label_values(&[error_type])
            .inc();
    }

    fn check_compensation_threshold(&self) -> Result<(), ValidatorError> {
        let consecutive = self.consecutive_compensation_failures.load(Ordering::SeqCst);
        if consecutive >= self.config.compensation_failure_threshold {
            error!(consecutive, "compensation failure threshold reached");
            return Err(ValidatorError::CompensationThreshold(consecutive));
        }
        Ok(())
    }

    async fn refresh_queue_depth(&self) {
        match self
            .broker
            .queue_depth(&self.config.queues.validation_queue)
            .await
        {
            Ok(depth) => self
                .metrics
                .validation_queue_size
                .set(i64::try_from(depth).unwrap_or(i64::MAX)),
            Err(e) => debug!(error = %e, "queue depth unavailable"),
        }
    }

    /// Declare the pipeline queues and consume until shutdown.
    ///
    /// Shutdown is checked between messages; the message in hand is always
    /// finished and settled first. The broker is closed on the way out.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ValidatorError> {
        let result = self.consume(&mut shutdown).await;
        if let Err(e) = self.broker.close().await {
            warn!(error = %e, "broker close failed");
        }
        info!(worker_id = %self.config.worker_id, "validation worker stopped");
        result
    }

    async fn consume(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<(), ValidatorError> {
        for spec in self.config.queues.all_specs() {
            self.broker.declare(&spec).await?;
        }
        let queue = &self.config.queues.validation_queue;
        let mut deliveries = self.broker.consume(queue, &self.config.worker_id).await?;
        let mut depth_tick =
            tokio::time::interval(Duration::from_millis(self.config.queue_depth_interval_ms));

        info!(worker_id = %self.config.worker_id, queue = %queue, "validation worker started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("shutdown requested, stopping intake");
                    return Ok(());
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        let verdict = self.handle(&delivery.body).await;
                        debug!(
                            outcome = verdict.outcome.label(),
                            disposition = %verdict.disposition,
                            redelivered = delivery.redelivered,
                            "message settled"
                        );
                        if let Err(e) = delivery.settle(verdict.disposition).await {
                            error!(error = %e, "failed to settle delivery");
                        }
                        self.check_compensation_threshold()?;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "delivery stream failed");
                        return Err(e.into());
                    }
                    None => {
                        warn!("delivery stream closed by broker");
                        return Ok(());
                    }
                },
                _ = depth_tick.tick() => self.refresh_queue_depth().await,
            }
        }
    }
}
