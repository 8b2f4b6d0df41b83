//! Validation worker for the ballot pipeline.
//!
//! Consumes raw submissions from the validation queue and decides, per
//! message, whether the vote counts. Every syntactically valid submission
//! leaves exactly one of `validated`, `duplicate` or `invalid` in the audit
//! log; accepted votes are forwarded to the aggregation queue.

pub mod config;
pub mod error;
pub mod metrics;
pub mod worker;

pub use config::ValidatorConfig;
pub use error::ValidatorError;
pub use metrics::ValidatorMetrics;
pub use worker::{Outcome, ValidationWorker, Verdict};
