use async_trait::async_trait;
use ballot_queue::{Broker, Delivery, DeliveryStream, QueueError, QueueSpec};
use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongInt};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::acker::AmqpAcker;

const PERSISTENT: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
}

impl AmqpBroker {
    /// Open a connection and a confirm-mode channel with the given prefetch.
    pub async fn connect(url: &str, prefetch: u16) -> Result<Self, QueueError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(connection_error)?;
        let channel = connection
            .create_channel()
            .await
            .map_err(connection_error)?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(connection_error)?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(connection_error)?;
        info!(prefetch, "connected to broker");
        Ok(Self {
            connection,
            channel,
        })
    }

    /// [`connect`](Self::connect), retrying with a fixed delay.
    pub async fn connect_with_retry(
        url: &str,
        prefetch: u16,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self, QueueError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match Self::connect(url, prefetch).await {
                Ok(broker) => return Ok(broker),
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "broker connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn connection_error(e: lapin::Error) -> QueueError {
    QueueError::Connection(e.to_string())
}

/// `x-message-ttl` and `x-max-length` arguments for a queue.
pub(crate) fn queue_arguments(spec: &QueueSpec) -> Result<FieldTable, QueueError> {
    let bound = |field: &str, value: u32| {
        LongInt::try_from(value).map_err(|_| QueueError::Declare {
            queue: spec.name.clone(),
            reason: format!("{field} {value} exceeds the AMQP long-int range"),
        })
    };
    let mut args = FieldTable::default();
    args.insert(
        "x-message-ttl".into(),
        AMQPValue::LongInt(bound("message_ttl_ms", spec.message_ttl_ms)?),
    );
    args.insert(
        "x-max-length".into(),
        AMQPValue::LongInt(bound("max_length", spec.max_length)?),
    );
    Ok(args)
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare(&self, spec: &QueueSpec) -> Result<(), QueueError> {
        let args = queue_arguments(spec)?;
        self.channel
            .queue_declare(
                &spec.name,
                QueueDeclareOptions {
                    durable: spec.durable,
                    ..Default::default()
                },
                args,
            )
            .await
            .map_err(|e| QueueError::Declare {
                queue: spec.name.clone(),
                reason: e.to_string(),
            })?;
        debug!(queue = %spec.name, "queue declared");
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        let publish_error = |reason: String| QueueError::Publish {
            queue: queue.to_string(),
            reason,
        };
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into());
        let confirmation = self
            .channel
            .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
            .await
            .map_err(|e| publish_error(e.to_string()))?
            .await
            .map_err(|e| publish_error(e.to_string()))?;
        if confirmation.is_nack() {
            return Err(publish_error("negatively acknowledged by broker".into()));
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, QueueError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Consume(e.to_string()))?;
        info!(queue, consumer_tag, "consuming");
        let stream = consumer.map(|next| {
            next.map(|d| Delivery::new(d.data, d.redelivered, Box::new(AmqpAcker(d.acker))))
                .map_err(|e| QueueError::Consume(e.to_string()))
        });
        Ok(stream.boxed())
    }

    async fn queue_depth(&self, queue: &str) -> Result<u64, QueueError> {
        let state = self
            .channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Declare {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        Ok(u64::from(state.message_count()))
    }

    async fn close(&self) -> Result<(), QueueError> {
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "closing").await {
            debug!(error = %e, "channel close failed");
        }
        self.connection
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(connection_error)?;
        info!("broker connection closed");
        Ok(())
    }
}
