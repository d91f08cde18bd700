//! HTTP delivery of events to the sink
//!
//! The wire contract: POST with the event body verbatim, envelope carried in
//! headers. Any 2xx is success; everything else, including transport errors
//! and the bounded timeout, is a delivery failure for the pump to reject.

use crate::error::{AdapterError, Result};
use crate::event::Event;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const HEADER_SPECVERSION: &str = "ce-specversion";
pub const HEADER_ID: &str = "ce-id";
pub const HEADER_TYPE: &str = "ce-type";
pub const HEADER_TIME: &str = "ce-time";
pub const HEADER_SOURCE: &str = "ce-source";

/// Capability interface over event delivery.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. `Ok` means the sink took responsibility for it.
    async fn deliver(&self, event: &Event) -> Result<()>;
}

/// Posts events to a fixed sink URI over HTTP.
pub struct HttpEventPoster {
    client: reqwest::Client,
    sink_uri: String,
}

impl HttpEventPoster {
    /// `timeout` bounds each POST end to end, connect included.
    pub fn new(sink_uri: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::config(format!("build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            sink_uri: sink_uri.into(),
        })
    }
}

#[async_trait]
impl EventSink for HttpEventPoster {
    async fn deliver(&self, event: &Event) -> Result<()> {
        let response = self
            .client
            .post(&self.sink_uri)
            .header(HEADER_SPECVERSION, "1.0")
            .header(HEADER_ID, &event.id)
            .header(HEADER_TYPE, &event.event_type)
            .header(HEADER_TIME, event.time.to_rfc3339())
            .header(HEADER_SOURCE, &event.source)
            .body(event.body.clone())
            .send()
            .await
            .map_err(|e| AdapterError::delivery(format!("POST {}: {}", self.sink_uri, e)))?;

        let status = response.status();
        if status.is_success() {
            debug!(id = %event.id, %status, "event delivered");
            Ok(())
        } else {
            Err(AdapterError::delivery(format!(
                "sink returned {}",
                status
            )))
        }
    }
}
