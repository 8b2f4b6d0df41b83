//! In-memory batch of accepted votes.
//!
//! One lock guards the batch. It is held only to append, or to swap the
//! batch out for a flush; storage I/O never happens under it. Votes swapped
//! out for a flush stay counted in [`Batcher::held`] until the flush settles.

use ballot_messages::AcceptedVote;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

struct BatchState {
    votes: Vec<AcceptedVote>,
    in_flight: usize,
    last_flush: Instant,
}

pub struct Batcher {
    state: Mutex<BatchState>,
    threshold: usize,
    full: Notify,
    flushed: Notify,
}

impl Batcher {
    pub fn new(threshold: usize) -> Self {
        Self {
            state: Mutex::new(BatchState {
                votes: Vec::with_capacity(threshold),
                in_flight: 0,
                last_flush: Instant::now(),
            }),
            threshold,
            full: Notify::new(),
            flushed: Notify::new(),
        }
    }

    /// Append a vote. Wakes the flusher once the threshold is reached.
    /// Returns the new batch length.
    pub async fn push(&self, vote: AcceptedVote) -> usize {
        let len = {
            let mut state = self.state.lock().await;
            state.votes.push(vote);
            state.votes.len()
        };
        if len >= self.threshold {
            self.full.notify_one();
        }
        len
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.votes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Votes in memory: waiting plus any swapped out for a flush.
    pub async fn held(&self) -> usize {
        let state = self.state.lock().await;
        state.votes.len() + state.in_flight
    }

    /// Resolves when a push has filled the batch.
    pub async fn filled(&self) {
        self.full.notified().await
    }

    /// Resolves after a flush succeeds.
    pub async fn flushed(&self) {
        self.flushed.notified().await
    }

    /// Swap the batch out if it is due: non-empty and either forced, at the
    /// size threshold, or older than `timeout` since the last flush.
    pub async fn take_if_due(
        &self,
        now: Instant,
        timeout: Duration,
        force: bool,
    ) -> Option<Vec<AcceptedVote>> {
        let mut state = self.state.lock().await;
        if state.votes.is_empty() {
            return None;
        }
        let due = force
            || state.votes.len() >= self.threshold
            || now.saturating_duration_since(state.last_flush) >= timeout;
        if !due {
            return None;
        }
        let taken = std::mem::replace(&mut state.votes, Vec::with_capacity(self.threshold));
        state.in_flight = taken.len();
        Some(taken)
    }

    /// Put a batch whose flush failed back in front of anything that
    /// arrived meanwhile.
    pub async fn restore(&self, mut votes: Vec<AcceptedVote>) {
        let mut state = self.state.lock().await;
        votes.append(&mut state.votes);
        state.votes = votes;
        state.in_flight = 0;
    }

    pub async fn mark_flushed(&self, at: Instant) {
        {
            let mut state = self.state.lock().await;
            state.last_flush = at;
            state.in_flight = 0;
        }
        self.flushed.notify_one();
    }
}
