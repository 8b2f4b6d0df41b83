//! Fundamental types for the ballot pipeline.
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: voter hashes, error patterns, ballots and their subjects, and
//! the audit status of a processing attempt.

pub mod ballot;
pub mod error;
pub mod hash;
pub mod status;

pub use ballot::{Ballot, LawChoice, Subject};
pub use error::TypeError;
pub use hash::{ErrorPattern, VoterHash, DEFAULT_PATTERN_LEN};
pub use status::VoteStatus;
