//! Prometheus metrics for the aggregation service.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry, Histogram,
    HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

pub struct AggregatorMetrics {
    pub registry: Registry,

    /// Votes flushed into the tally store, by subject and choice.
    pub votes_aggregated: IntCounterVec,
    pub aggregation_errors: IntCounterVec,

    /// Storage-authoritative totals, refreshed after every flush.
    pub current_vote_totals: IntGaugeVec,
    /// Votes acknowledged but not yet flushed.
    pub pending_votes: IntGauge,

    pub batch_size: Histogram,
    pub flush_seconds: Histogram,
}

impl AggregatorMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let votes_aggregated = register_int_counter_vec_with_registry!(
            Opts::new(
                "ballot_votes_aggregated_total",
                "Votes written to the tally store"
            ),
            &["subject", "choice"],
            registry
        )
        .expect("failed to register votes_aggregated counter");

        let aggregation_errors = register_int_counter_vec_with_registry!(
            Opts::new(
                "ballot_aggregation_errors_total",
                "Aggregation errors by type"
            ),
            &["error_type"],
            registry
        )
        .expect("failed to register aggregation_errors counter");

        let current_vote_totals = register_int_gauge_vec_with_registry!(
            Opts::new(
                "ballot_current_vote_totals",
                "Current tally per subject and choice, as stored"
            ),
            &["subject", "choice"],
            registry
        )
        .expect("failed to register current_vote_totals gauge");

        let pending_votes = register_int_gauge_with_registry!(
            Opts::new(
                "ballot_pending_votes",
                "Accepted votes waiting in the in-memory batch"
            ),
            registry
        )
        .expect("failed to register pending_votes gauge");

        let batch_size = register_histogram_with_registry!(
            HistogramOpts::new("ballot_batch_size", "Votes per flushed batch")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
            registry
        )
        .expect("failed to register batch_size histogram");

        // 1 ms → ~16 s
        let flush_seconds = register_histogram_with_registry!(
            HistogramOpts::new(
                "ballot_flush_duration_seconds",
                "Time to write one batch to the tally store"
            )
            .buckets(prometheus::exponential_buckets(0.001, 2.0, 15).unwrap()),
            registry
        )
        .expect("failed to register flush_seconds histogram");

        Self {
            registry,
            votes_aggregated,
            aggregation_errors,
            current_vote_totals,
            pending_votes,
            batch_size,
            flush_seconds,
        }
    }
}

impl Default for AggregatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
