//! A consumed message and how it is settled.

use async_trait::async_trait;
use std::fmt;

use crate::QueueError;

/// Final outcome for a delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove from the queue.
    Ack,
    /// Transient failure; return to the queue for redelivery.
    Requeue,
    /// Permanent failure; drop without redelivery.
    Reject,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Requeue => "requeue",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker-side handle that settles one delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), QueueError>;
    async fn nack(&self, requeue: bool) -> Result<(), QueueError>;
    async fn reject(&self, requeue: bool) -> Result<(), QueueError>;
}

pub struct Delivery {
    pub body: Vec<u8>,
    /// Set by the broker when this message was delivered before.
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, redelivered: bool, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            body,
            redelivered,
            acker,
        }
    }

    /// Settle the delivery. Consumes it so it cannot be settled twice.
    pub async fn settle(self, disposition: Disposition) -> Result<(), QueueError> {
        match disposition {
            Disposition::Ack => self.acker.ack().await,
            Disposition::Requeue => self.acker.nack(true).await,
            Disposition::Reject => self.acker.reject(false).await,
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("bytes", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}
