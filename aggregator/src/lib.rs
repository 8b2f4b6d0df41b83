//! Aggregation service for the ballot pipeline.
//!
//! Accepted votes are acknowledged as soon as they are in the in-memory
//! [`Batcher`]; a dedicated flush task drains the batch into the tally store
//! when it reaches its size threshold or its timeout elapses. A failed flush
//! keeps every vote for the next attempt.

pub mod batcher;
pub mod config;
pub mod error;
pub mod metrics;
pub mod service;

pub use batcher::Batcher;
pub use config::AggregatorConfig;
pub use error::AggregatorError;
pub use metrics::AggregatorMetrics;
pub use service::AggregationService;
