//! Broker abstraction for the three pipeline queues.
//!
//! The validator and aggregator talk to a [`Broker`] only. Each consumed
//! [`Delivery`] carries its own [`Acknowledger`] and must be settled exactly
//! once with a [`Disposition`].

pub mod broker;
pub mod delivery;
pub mod error;
pub mod settings;

pub use broker::{Broker, DeliveryStream};
pub use delivery::{Acknowledger, Delivery, Disposition};
pub use error::QueueError;
pub use settings::{QueueSettings, QueueSpec};
