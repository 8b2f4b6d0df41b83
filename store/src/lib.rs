//! Abstract storage traits for the ballot pipeline.
//!
//! Every backend (Redis, PostgreSQL, in-memory for testing) implements these
//! traits. The validator and aggregator depend only on the traits and receive
//! concrete implementations as `Arc<dyn ...>` at startup.

pub mod audit;
pub mod dedup;
pub mod error;
pub mod tally;

pub use audit::{AuditRecord, AuditStore};
pub use dedup::{keys, DedupStore};
pub use error::StoreError;
pub use tally::{tally_deltas, TallyDelta, TallyRecord, TallyStore};
