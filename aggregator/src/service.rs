use ballot_messages::{AcceptedVote, MessageStatus};
use ballot_queue::{Broker, Disposition};
use ballot_store::{tally_deltas, TallyStore};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{AggregatorConfig, AggregatorError, AggregatorMetrics, Batcher};

/// Consumes accepted votes and keeps the tally store current.
pub struct AggregationService {
    config: AggregatorConfig,
    tally: Arc<dyn TallyStore>,
    broker: Arc<dyn Broker>,
    batcher: Batcher,
    metrics: Arc<AggregatorMetrics>,
}

impl AggregationService {
    pub fn new(
        config: AggregatorConfig,
        tally: Arc<dyn TallyStore>,
        broker: Arc<dyn Broker>,
        metrics: Arc<AggregatorMetrics>,
    ) -> Self {
        let batcher = Batcher::new(config.batch_size);
        Self {
            config,
            tally,
            broker,
            batcher,
            metrics,
        }
    }

    pub fn metrics(&self) -> &AggregatorMetrics {
        &self.metrics
    }

    pub async fn pending(&self) -> usize {
        self.batcher.len().await
    }

    /// Take one accepted-vote payload into the batch. Acknowledgement
    /// follows enqueue, not the database commit.
    pub async fn accept(&self, body: &[u8]) -> Disposition {
        let vote = match AcceptedVote::from_slice(body) {
            Ok(vote) => vote,
            Err(e) => {
                self.count_error("malformed");
                warn!(error = %e, "malformed accepted vote rejected");
                return Disposition::Reject;
            }
        };
        if vote.status != MessageStatus::Valid {
            self.count_error("unexpected_status");
            warn!(hash = ?vote.voter_hash, "accepted vote without valid status rejected");
            return Disposition::Reject;
        }

        let pending = self.batcher.push(vote).await;
        self.metrics.pending_votes.set(pending as i64);
        Disposition::Ack
    }

    /// Flush the batch if it is due, or unconditionally when `force` is set.
    ///
    /// On failure the votes go back into the batch and the error is
    /// returned; nothing is lost or applied twice. Returns the number of
    /// votes written.
    pub async fn flush(&self, force: bool) -> Result<usize, AggregatorError> {
        let Some(votes) = self
            .batcher
            .take_if_due(Instant::now(), self.config.batch_timeout(), force)
            .await
        else {
            return Ok(0);
        };

        let timer = self.metrics.flush_seconds.start_timer();
        let deltas = tally_deltas(votes.iter().map(|v| &v.ballot));
        if let Err(e) = self.tally.apply(&deltas).await {
            timer.stop_and_discard();
            self.count_error("flush");
            let retained = votes.len();
            self.batcher.restore(votes).await;
            warn!(error = %e, retained, "flush failed, batch retained for retry");
            return Err(e.into());
        }
        timer.observe_duration();
        self.batcher.mark_flushed(Instant::now()).await;

        for vote in &votes {
            let subject = vote.ballot.subject().to_string();
            let choice = vote.ballot.choice_label();
            self.metrics
                .votes_aggregated
                .with_label_values(&[subject.as_str(), choice.as_str()])
                .inc();
        }
        self.metrics.batch_size.observe(votes.len() as f64);
        self.metrics
            .pending_votes
            .set(self.batcher.len().await as i64);
        info!(votes = votes.len(), subjects = deltas.len(), "batch flushed");

        self.resync_totals().await;
        Ok(votes.len())
    }

    /// Republish stored totals as gauges.
    async fn resync_totals(&self) {
        match self.tally.totals().await {
            Ok(records) => {
                for record in records {
                    let subject = record.subject().to_string();
                    for (choice, count) in record.choice_counts() {
                        self.metrics
                            .current_vote_totals
                            .with_label_values(&[subject.as_str(), choice])
                            .set(count);
                    }
                }
            }
            Err(e) => {
                self.count_error("resync");
                warn!(error = %e, "failed to resync vote totals");
            }
        }
    }

    fn count_error(&self, error_type: &str) {
        self.metrics
            .aggregation_errors
            .with_label_values(&[error_type])
            .inc();
    }

    async fn flush_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.flush_tick());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = tick.tick() => {}
                _ = self.batcher.filled() => {}
            }
            if let Err(e) = self.flush(false).await {
                debug!(
                    error = %e,
                    backoff_ms = self.config.flush_retry_backoff_ms,
                    "periodic flush failed, backing off"
                );
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(self.config.flush_retry_backoff()) => {}
                }
            }
        }
    }

    async fn final_flush(&self) {
        for attempt in 1..=self.config.final_flush_attempts.max(1) {
            match self.flush(true).await {
                Ok(flushed) => {
                    info!(flushed, "final flush complete");
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "final flush failed");
                    tokio::time::sleep(Duration::from_millis(
                        self.config.final_flush_retry_delay_ms,
                    ))
                    .await;
                }
            }
        }
        let pending = self.batcher.len().await;
        error!(
            pending,
            "giving up on final flush; pending votes are only in the audit log"
        );
    }

    /// Consume the aggregation queue until shutdown, then drain.
    ///
    /// Intake stops first, the flush task is joined, one forced flush
    /// empties the batch and only then is the broker closed.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), AggregatorError> {
        let queue = self.config.queues.aggregation_queue.clone();
        self.broker.declare(&self.config.queues.spec(&queue)).await?;
        let mut deliveries = self
            .broker
            .consume(&queue, &self.config.consumer_tag)
            .await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let flusher = tokio::spawn(self.clone().flush_loop(stop_rx));

        info!(
            queue = %queue,
            batch_size = self.config.batch_size,
            batch_timeout_ms = self.config.batch_timeout_ms,
            "aggregation service started"
        );

        let result = loop {
            let held = self.batcher.held().await;
            if held >= self.config.max_pending {
                warn!(
                    held,
                    max_pending = self.config.max_pending,
                    "batch at capacity, intake paused until a flush succeeds"
                );
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        info!("shutdown requested, stopping intake");
                        break Ok(());
                    }
                    _ = self.batcher.flushed() => continue,
                }
            }
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("shutdown requested, stopping intake");
                    break Ok(());
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        let disposition = self.accept(&delivery.body).await;
                        if let Err(e) = delivery.settle(disposition).await {
                            error!(error = %e, "failed to settle delivery");
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "delivery stream failed");
                        break Err(e.into());
                    }
                    None => {
                        warn!("delivery stream closed by broker");
                        break Ok(());
                    }
                },
            }
        };
        drop(deliveries);

        let _ = stop_tx.send(true);
        if let Err(e) = flusher.await {
            error!(error = %e, "flush task panicked");
        }
        self.final_flush().await;

        if let Err(e) = self.broker.close().await {
            warn!(error = %e, "broker close failed");
        }
        info!("aggregation service stopped");
        result
    }
}
