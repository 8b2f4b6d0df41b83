use async_trait::async_trait;
use ballot_queue::{Acknowledger, QueueError};
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};

pub(crate) struct AmqpAcker(pub(crate) Acker);

fn ack_error(e: lapin::Error) -> QueueError {
    QueueError::Ack(e.to_string())
}

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.0.ack(BasicAckOptions::default()).await.map_err(ack_error)
    }

    async fn nack(&self, requeue: bool) -> Result<(), QueueError> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map_err(ack_error)
    }

    async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
        self.0
            .reject(BasicRejectOptions { requeue })
            .await
            .map_err(ack_error)
    }
}
