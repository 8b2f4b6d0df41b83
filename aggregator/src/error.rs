use ballot_messages::MessageError;
use ballot_queue::QueueError;
use ballot_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("message error: {0}")]
    Message(#[from] MessageError),
}
