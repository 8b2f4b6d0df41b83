//! Redis-backed [`DedupStore`](ballot_store::DedupStore).
//!
//! Sets and counters map one-to-one onto Redis primitives. `SADD` returns
//! the number of members actually added, which is what makes
//! `mark_voted` and `record_error_pattern` race-free across workers.

pub mod error;
pub mod store;

pub use error::RedisStoreError;
pub use store::RedisDedupStore;
