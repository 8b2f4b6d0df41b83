//! RabbitMQ implementation of [`ballot_queue::Broker`].
//!
//! One connection and one channel per process. The channel runs in publisher
//! confirm mode so `publish` only returns once the broker holds the message.

mod acker;
mod broker;

pub use broker::AmqpBroker;
