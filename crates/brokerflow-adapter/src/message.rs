//! Broker-facing capability traits
//!
//! The pump only ever sees these traits. One implementation speaks AMQP
//! ([`crate::amqp::AmqpSource`]); tests substitute deterministic fixtures.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// A message pulled off the broker queue, detached from its delivery state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Raw payload, forwarded verbatim
    pub body: Bytes,
    /// Application properties / headers
    pub properties: HashMap<String, String>,
}

/// Terminal disposition for one delivery.
///
/// Both calls consume the handle, so a second terminal call on the same
/// delivery is unrepresentable. Dropping the handle without calling either
/// leaves the delivery unacknowledged; the broker redelivers it after the
/// channel closes.
#[async_trait]
pub trait DeliveryHandle: Send {
    /// Settle the delivery; the broker removes the message permanently and
    /// replenishes one credit.
    async fn accept(self: Box<Self>) -> Result<()>;

    /// Give the message back for broker-side redelivery.
    async fn reject(self: Box<Self>) -> Result<()>;
}

/// A message together with its one-shot disposition handle.
pub struct ReceivedMessage {
    pub message: Message,
    pub handle: Box<dyn DeliveryHandle>,
}

/// Capability interface over the receiving link.
#[async_trait]
pub trait MessageSource: Send {
    /// Block until the next message is available. An error here means the
    /// link itself failed, not a single delivery.
    async fn receive(&mut self) -> Result<ReceivedMessage>;
}
