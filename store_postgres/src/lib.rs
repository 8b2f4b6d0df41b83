//! PostgreSQL-backed [`AuditStore`](ballot_store::AuditStore) and
//! [`TallyStore`](ballot_store::TallyStore).
//!
//! Tables:
//! - `vote_audit`: append-only, one row per processing attempt
//! - `vote_results`: one row per law, additive upserts only
//! - `election_results`: one row per (election, region, candidate)
//! - `duplicate_attempts`: durable duplicate history per hash

pub mod error;
pub mod rebuild;
pub mod schema;
pub mod store;

pub use error::PostgresStoreError;
pub use rebuild::RebuildSummary;
pub use store::{PgPoolSettings, PostgresStore};
