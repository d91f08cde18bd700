//! The forward loop
//!
//! Receives, converts, posts and settles one delivery at a time, with
//! dispositions in receive order. Every received message reaches exactly one terminal
//! disposition before the next receive is issued, including on shutdown,
//! where an in-hand message is rejected so the broker redelivers it.

use crate::error::Result;
use crate::event::EventFactory;
use crate::message::MessageSource;
use crate::poster::EventSink;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Metrics for the pump
#[derive(Clone)]
pub struct PumpMetrics {
    /// Counter for events accepted downstream
    pub forwarded: metrics::Counter,
    /// Counter for deliveries rejected back to the broker
    pub rejected: metrics::Counter,
}

impl PumpMetrics {
    pub fn new() -> Self {
        Self {
            forwarded: metrics::counter!("brokerflow_adapter_events_forwarded_total"),
            rejected: metrics::counter!("brokerflow_adapter_deliveries_rejected_total"),
        }
    }
}

impl Default for PumpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one message source into one event sink.
pub struct Pump<S: MessageSource, K: EventSink> {
    source: S,
    sink: K,
    events: EventFactory,
    metrics: PumpMetrics,
}

impl<S: MessageSource, K: EventSink> Pump<S, K> {
    pub fn new(source: S, sink: K, events: EventFactory) -> Self {
        Self {
            source,
            sink,
            events,
            metrics: PumpMetrics::new(),
        }
    }

    /// Hand the source back, e.g. to close it cleanly after the loop exits.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Run until shutdown or a fatal source error. Delivery failures are
    /// contained to their iteration; an `Err` from here means the link or
    /// channel is gone and the process should exit for a supervised restart.
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("pump started");

        loop {
            let received = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("shutdown requested");
                    return Ok(());
                }
                received = self.source.receive() => received?,
            };

            let event = self.events.event_from(&received.message);

            let outcome = tokio::select! {
                _ = shutdown_rx.recv() => None,
                outcome = self.sink.deliver(&event) => Some(outcome),
            };

            let Some(outcome) = outcome else {
                // Shutdown aborted the POST. The message must go back for
                // redelivery, not vanish with the process.
                received.handle.reject().await?;
                info!(id = %event.id, "shutdown during delivery, message returned to broker");
                return Ok(());
            };

            match outcome {
                Ok(()) => {
                    received.handle.accept().await?;
                    self.metrics.forwarded.increment(1);
                    debug!(id = %event.id, "event forwarded");
                }
                Err(e) => {
                    warn!(id = %event.id, error = %e, "delivery failed, rejecting");
                    received.handle.reject().await?;
                    self.metrics.rejected.increment(1);
                }
            }
        }
    }
}
