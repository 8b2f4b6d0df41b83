//! Nullable broker: per-queue channels with recorded settlements.

use async_trait::async_trait;
use ballot_queue::{
    Acknowledger, Broker, Delivery, DeliveryStream, Disposition, QueueError, QueueSpec,
};
use futures_util::stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

type Message = (Vec<u8>, bool);

/// How a delivery was settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub queue: String,
    pub body: Vec<u8>,
    pub disposition: Disposition,
}

struct QueueState {
    tx: mpsc::UnboundedSender<Message>,
    rx: Option<mpsc::UnboundedReceiver<Message>>,
    depth: u64,
    published: Vec<Vec<u8>>,
    failing_publishes: usize,
}

impl QueueState {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            depth: 0,
            published: Vec::new(),
            failing_publishes: 0,
        }
    }
}

#[derive(Default)]
struct Shared {
    queues: Mutex<HashMap<String, QueueState>>,
    declared: Mutex<Vec<QueueSpec>>,
    settlements: Mutex<Vec<Settlement>>,
    settled: Notify,
    closed: Mutex<bool>,
}

impl Shared {
    fn enqueue(&self, queue: &str, body: Vec<u8>, redelivered: bool) {
        let mut queues = self.queues.lock().unwrap();
        let state = queues
            .entry(queue.to_string())
            .or_insert_with(QueueState::new);
        if state.tx.send((body, redelivered)).is_ok() {
            state.depth += 1;
        }
    }
}

/// In-memory [`Broker`] with at-least-once semantics: a requeued delivery
/// comes back on the same consumer with `redelivered` set.
#[derive(Clone, Default)]
pub struct NullBroker {
    shared: Arc<Shared>,
}

impl NullBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a message on a queue as if an external producer had published it.
    pub fn inject(&self, queue: &str, body: impl Into<Vec<u8>>) {
        self.shared.enqueue(queue, body.into(), false);
    }

    /// Payloads published through [`Broker::publish`] to `queue`.
    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.shared
            .queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|q| q.published.clone())
            .unwrap_or_default()
    }

    /// Make the next `times` publishes to `queue` fail.
    pub fn fail_publishes(&self, queue: &str, times: usize) {
        self.shared
            .queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_insert_with(QueueState::new)
            .failing_publishes = times;
    }

    pub fn declared(&self) -> Vec<QueueSpec> {
        self.shared.declared.lock().unwrap().clone()
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.shared.settlements.lock().unwrap().clone()
    }

    pub fn settlements_with(&self, disposition: Disposition) -> usize {
        self.shared
            .settlements
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.disposition == disposition)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.lock().unwrap()
    }

    /// Wait until at least `count` deliveries have been settled.
    /// Returns `false` on timeout.
    pub async fn wait_for_settlements(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.shared.settled.notified();
                if self.shared.settlements.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

struct NullAcker {
    shared: Arc<Shared>,
    queue: String,
    body: Vec<u8>,
}

impl NullAcker {
    fn settle(&self, disposition: Disposition) {
        self.shared.settlements.lock().unwrap().push(Settlement {
            queue: self.queue.clone(),
            body: self.body.clone(),
            disposition,
        });
        if disposition == Disposition::Requeue && !*self.shared.closed.lock().unwrap() {
            self.shared.enqueue(&self.queue, self.body.clone(), true);
        }
        self.shared.settled.notify_waiters();
    }
}

#[async_trait]
impl Acknowledger for NullAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.settle(Disposition::Ack);
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), QueueError> {
        self.settle(if requeue {
            Disposition::Requeue
        } else {
            Disposition::Reject
        });
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
        self.nack(requeue).await
    }
}

#[async_trait]
impl Broker for NullBroker {
    async fn declare(&self, spec: &QueueSpec) -> Result<(), QueueError> {
        self.shared.declared.lock().unwrap().push(spec.clone());
        self.shared
            .queues
            .lock()
            .unwrap()
            .entry(spec.name.clone())
            .or_insert_with(QueueState::new);
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        {
            let mut queues = self.shared.queues.lock().unwrap();
            let state = queues
                .entry(queue.to_string())
                .or_insert_with(QueueState::new);
            if state.failing_publishes > 0 {
                state.failing_publishes -= 1;
                return Err(QueueError::Publish {
                    queue: queue.to_string(),
                    reason: "injected failure".into(),
                });
            }
            state.published.push(payload.to_vec());
        }
        self.shared.enqueue(queue, payload.to_vec(), false);
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        _consumer_tag: &str,
    ) -> Result<DeliveryStream, QueueError> {
        let rx = self
            .shared
            .queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_insert_with(QueueState::new)
            .rx
            .take()
            .ok_or_else(|| QueueError::Consume(format!("{queue} already has a consumer")))?;

        let shared = self.shared.clone();
        let queue = queue.to_string();
        let deliveries = stream::unfold((rx, shared, queue), |(mut rx, shared, queue)| async move {
            let (body, redelivered) = rx.recv().await?;
            if let Some(state) = shared.queues.lock().unwrap().get_mut(&queue) {
                state.depth = state.depth.saturating_sub(1);
            }
            let acker = NullAcker {
                shared: shared.clone(),
                queue: queue.clone(),
                body: body.clone(),
            };
            let delivery = Delivery::new(body, redelivered, Box::new(acker));
            Some((Ok(delivery), (rx, shared, queue)))
        });
        Ok(Box::pin(deliveries))
    }

    async fn queue_depth(&self, queue: &str) -> Result<u64, QueueError> {
        Ok(self
            .shared
            .queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|q| q.depth)
            .unwrap_or(0))
    }

    async fn close(&self) -> Result<(), QueueError> {
        *self.shared.closed.lock().unwrap() = true;
        Ok(())
    }
}
