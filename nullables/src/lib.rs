//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the pipeline (key-value store, audit
//! database, tally database, message broker) sits behind a trait. This crate
//! provides in-memory implementations that:
//! - Behave like the real backend for the operations the pipeline uses
//! - Can be made to fail per operation, to exercise compensation paths
//! - Expose their state for assertions
//! - Never touch the network
//!
//! Usage: hand these to the validator/aggregator as `Arc<dyn ...>` in tests.

pub mod audit;
pub mod broker;
pub mod dedup;
pub mod tally;

pub use audit::{DuplicateAttempts, NullAuditStore};
pub use broker::{NullBroker, Settlement};
pub use dedup::NullDedupStore;
pub use tally::NullTallyStore;

use std::collections::HashSet;
use std::sync::Mutex;

/// Operation names currently forced to fail.
#[derive(Default)]
pub(crate) struct FailureSwitch {
    ops: Mutex<HashSet<String>>,
}

impl FailureSwitch {
    pub(crate) fn fail(&self, op: &str) {
        self.ops.lock().unwrap().insert(op.to_string());
    }

    pub(crate) fn heal(&self, op: &str) {
        self.ops.lock().unwrap().remove(op);
    }

    pub(crate) fn heal_all(&self) {
        self.ops.lock().unwrap().clear();
    }

    pub(crate) fn is_failing(&self, op: &str) -> bool {
        let ops = self.ops.lock().unwrap();
        ops.contains(op) || ops.contains("*")
    }
}
