//! Canonical event envelope
//!
//! Each broker message becomes exactly one [`Event`]. Event ids combine a
//! per-process instance id with a monotonic sequence, so they stay unique
//! for the life of the process; downstream consumers treating delivery as
//! at-least-once can use the id as a dedup key.

use crate::message::Message;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Event type tag stamped on every forwarded message.
pub const EVENT_TYPE: &str = "dev.brokerflow.amqp.delivery";

/// Canonical outbound representation of one broker message.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Unique within this process's lifetime
    pub id: String,
    /// Fixed connector-specific tag
    pub event_type: String,
    /// When the message was converted
    pub time: DateTime<Utc>,
    /// Canonicalized broker address, credentials stripped
    pub source: String,
    /// Message body, verbatim
    pub body: Bytes,
}

/// Stamps messages into events.
pub struct EventFactory {
    instance: String,
    sequence: AtomicU64,
    source: String,
}

impl EventFactory {
    /// `canonical_source` must already be credential-free; it is emitted on
    /// every event.
    pub fn new(canonical_source: impl Into<String>) -> Self {
        Self {
            instance: Uuid::new_v4().to_string(),
            sequence: AtomicU64::new(0),
            source: canonical_source.into(),
        }
    }

    /// Derive the event for one message.
    pub fn event_from(&self, message: &Message) -> Event {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        Event {
            id: format!("{}-{}", self.instance, sequence),
            event_type: EVENT_TYPE.to_string(),
            time: Utc::now(),
            source: self.source.clone(),
            body: message.body.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_body_forwarded_verbatim() {
        let factory = EventFactory::new("amqp://broker.example/jobs");
        let message = Message {
            body: Bytes::from_static(b"\x00\x01payload"),
            properties: Default::default(),
        };

        let event = factory.event_from(&message);

        assert_eq!(event.body, message.body);
        assert_eq!(event.event_type, EVENT_TYPE);
        assert_eq!(event.source, "amqp://broker.example/jobs");
    }

    #[test]
    fn test_ids_unique_within_process() {
        let factory = EventFactory::new("amqp://broker.example/jobs");
        let message = Message::default();

        let ids: HashSet<String> = (0..1000)
            .map(|_| factory.event_from(&message).id)
            .collect();

        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_ids_distinct_across_instances() {
        let a = EventFactory::new("amqp://a/q");
        let b = EventFactory::new("amqp://b/q");
        let message = Message::default();

        assert_ne!(a.event_from(&message).id, b.event_from(&message).id);
    }
}
