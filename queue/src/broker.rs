use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::{Delivery, QueueError, QueueSpec};

/// Stream of deliveries from one consumer. Ends when the broker closes.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, QueueError>>;

/// Durable message broker with at-least-once delivery.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Idempotently declare a queue with its arguments.
    async fn declare(&self, spec: &QueueSpec) -> Result<(), QueueError>;

    /// Publish a persistent JSON message to `queue`. Returns once the broker
    /// has accepted it.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError>;

    /// Start consuming `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, QueueError>;

    /// Messages currently waiting in `queue`.
    async fn queue_depth(&self, queue: &str) -> Result<u64, QueueError>;

    /// Close the channel and connection. In-flight unacked deliveries are
    /// returned to their queues by the broker.
    async fn close(&self) -> Result<(), QueueError>;
}
