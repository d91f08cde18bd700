//! brokerflow-adapter - message pump from a broker queue to an event sink
//!
//! One process bridges exactly one queue to one sink:
//!
//! ```text
//! ┌──────────┐  receive   ┌──────────┐  POST    ┌──────────┐
//! │  Broker  │───────────▶│   Pump   │─────────▶│   Sink   │
//! │  queue   │◀───────────│          │          │  (HTTP)  │
//! └──────────┘ accept/    └──────────┘          └──────────┘
//!              reject
//! ```
//!
//! Deliveries are settled strictly in receive order, exactly one terminal
//! disposition each: `accept` on a 2xx from the sink, `reject` (requeue)
//! on anything else. Connection-level failures end the process; the
//! supervisor restarts it. Delivery is therefore at-least-once end to end,
//! and consumers dedup on the event id.
//!
//! ## Modules
//!
//! - [`message`] - message source and disposition capability traits
//! - [`amqp`] - AMQP implementation of the message source
//! - [`event`] - canonical event envelope and id allocation
//! - [`poster`] - HTTP delivery to the sink
//! - [`pump`] - the forward loop
//! - [`config`] - startup configuration
//! - [`error`] - adapter error types

pub mod amqp;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod poster;
pub mod pump;

pub use amqp::{parse_source_address, AmqpSource, SourceAddress};
pub use config::AdapterConfig;
pub use error::{AdapterError, Result};
pub use event::{Event, EventFactory, EVENT_TYPE};
pub use message::{DeliveryHandle, Message, MessageSource, ReceivedMessage};
pub use poster::{EventSink, HttpEventPoster};
pub use pump::{Pump, PumpMetrics};
