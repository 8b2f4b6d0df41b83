//! Prometheus metrics for the validation worker.
//!
//! [`ValidatorMetrics`] owns a dedicated [`Registry`] that the metrics
//! endpoint encodes into the Prometheus text exposition format.

use prometheus::{
    register_histogram_vec_with_registry, register_histogram_with_registry,
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, HistogramVec, IntCounter,
    IntCounterVec, IntGauge, Opts, Registry,
};

pub struct ValidatorMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Messages handled, by outcome.
    pub votes_processed: IntCounterVec,
    /// Rejections and transient failures, by kind.
    pub validation_errors: IntCounterVec,
    pub oversized_payloads: IntCounter,
    pub duplicate_attempts: IntCounter,
    /// Ineligible submissions whose pattern was seen for the first time.
    pub error_patterns_unique: IntCounter,
    /// Ineligible submissions whose pattern was already known.
    pub error_patterns_repeated: IntCounter,
    /// Audit failures whose voted-marker rollback also failed.
    pub compensation_failures: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub validation_queue_size: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub validation_seconds: Histogram,
    /// Per-call store latency, labelled by store and operation.
    pub store_operation_seconds: HistogramVec,
}

impl ValidatorMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let votes_processed = register_int_counter_vec_with_registry!(
            Opts::new(
                "ballot_votes_processed_total",
                "Votes processed by the validator, by outcome"
            ),
            &["status"],
            registry
        )
        .expect("failed to register votes_processed counter");

        let validation_errors = register_int_counter_vec_with_registry!(
            Opts::new(
                "ballot_validation_errors_total",
                "Validation errors by type"
            ),
            &["error_type"],
            registry
        )
        .expect("failed to register validation_errors counter");

        let oversized_payloads = register_int_counter_with_registry!(
            Opts::new(
                "ballot_oversized_payloads_total",
                "Payloads rejected for exceeding the size ceiling"
            ),
            registry
        )
        .expect("failed to register oversized_payloads counter");

        let duplicate_attempts = register_int_counter_with_registry!(
            Opts::new(
                "ballot_duplicate_attempts_total",
                "Submissions from hashes that had already voted"
            ),
            registry
        )
        .expect("failed to register duplicate_attempts counter");

        let error_patterns_unique = register_int_counter_with_registry!(
            Opts::new(
                "ballot_error_patterns_unique_total",
                "Ineligible submissions opening a new error pattern"
            ),
            registry
        )
        .expect("failed to register error_patterns_unique counter");

        let error_patterns_repeated = register_int_counter_with_registry!(
            Opts::new(
                "ballot_error_patterns_repeated_total",
                "Ineligible submissions matching a known error pattern"
            ),
            registry
        )
        .expect("failed to register error_patterns_repeated counter");

        let compensation_failures = register_int_counter_with_registry!(
            Opts::new(
                "ballot_compensation_failures_total",
                "Voted markers that could not be rolled back after an audit failure"
            ),
            registry
        )
        .expect("failed to register compensation_failures counter");

        let validation_queue_size = register_int_gauge_with_registry!(
            Opts::new(
                "ballot_validation_queue_size",
                "Messages waiting in the validation queue"
            ),
            registry
        )
        .expect("failed to register validation_queue_size gauge");

        // 0.5 ms → ~4 s
        let validation_seconds = register_histogram_with_registry!(
            HistogramOpts::new(
                "ballot_validation_duration_seconds",
                "Time to process one submission"
            )
            .buckets(prometheus::exponential_buckets(0.0005, 2.0, 14).unwrap()),
            registry
        )
        .expect("failed to register validation_seconds histogram");

        let store_operation_seconds = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "ballot_store_operation_duration_seconds",
                "Latency of individual store calls"
            )
            .buckets(prometheus::exponential_buckets(0.0001, 2.0, 16).unwrap()),
            &["store", "operation"],
            registry
        )
        .expect("failed to register store_operation_seconds histogram");

        Self {
            registry,
            votes_processed,
            validation_errors,
            oversized_payloads,
            duplicate_attempts,
            error_patterns_unique,
            error_patterns_repeated,
            compensation_failures,
            validation_queue_size,
            validation_seconds,
            store_operation_seconds,
        }
    }

    pub fn processed(&self, status: &str) -> u64 {
        self.votes_processed.with_label_values(&[status]).get()
    }
}

impl Default for ValidatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
