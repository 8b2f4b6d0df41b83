//! Wire schemas for the three pipeline queues.
//!
//! - [`VoteEvent`]: raw submission on the validation queue.
//! - [`AcceptedVote`]: validator → aggregator.
//! - [`ReviewEntry`]: validator → operators, one per new error pattern.
//!
//! Every message is JSON. Decoding of inbound votes is split into a parse
//! step and a field check so callers can tell a malformed payload from one
//! that merely lacks required fields.

pub mod accepted;
pub mod error;
pub mod review;
pub mod timestamp;
pub mod vote_event;

pub use accepted::AcceptedVote;
pub use error::MessageError;
pub use review::ReviewEntry;
pub use timestamp::parse_timestamp;
pub use vote_event::{RawVoteEvent, VoteEvent};

use serde::{Deserialize, Serialize};

/// The `status` field carried by outbound messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Valid,
    Invalid,
}
