use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("queue declaration failed for {queue}: {reason}")]
    Declare { queue: String, reason: String },

    #[error("publish to {queue} failed: {reason}")]
    Publish { queue: String, reason: String },

    #[error("consume failed: {0}")]
    Consume(String),

    #[error("acknowledgement failed: {0}")]
    Ack(String),

    #[error("broker closed")]
    Closed,
}
