//! Adapter startup configuration
//!
//! Everything arrives through flags or environment variables; the operator
//! injects `SOURCE_URI` and `SINK_URI` into the workload it creates.

use crate::error::{AdapterError, Result};
use clap::Parser;
use std::time::Duration;
use url::Url;

fn default_credit() -> u16 {
    10
}

/// Brokerflow adapter
#[derive(Parser, Debug, Clone)]
#[command(name = "brokerflow-adapter")]
#[command(about = "Forwards messages from one broker queue to an HTTP event sink")]
#[command(version)]
pub struct AdapterConfig {
    /// Broker address of the queue to drain
    #[arg(long, env = "SOURCE_URI")]
    pub source_uri: String,

    /// HTTP(S) sink events are delivered to
    #[arg(long, env = "SINK_URI")]
    pub sink_uri: String,

    /// Credit window: max unacknowledged deliveries in flight
    #[arg(long, env = "CREDIT", default_value_t = default_credit())]
    pub credit: u16,

    /// Per-event POST timeout in seconds
    #[arg(long, env = "POST_TIMEOUT_SECS", default_value_t = 30)]
    pub post_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl AdapterConfig {
    /// Cross-field checks clap cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.credit == 0 {
            return Err(AdapterError::config("credit must be at least 1"));
        }

        let sink = Url::parse(&self.sink_uri)
            .map_err(|e| AdapterError::config(format!("invalid sink URI: {}", e)))?;
        match sink.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AdapterError::config(format!(
                    "sink URI must use http or https, got '{}'",
                    scheme
                )));
            }
        }

        Ok(())
    }

    pub fn post_timeout(&self) -> Duration {
        Duration::from_secs(self.post_timeout_secs)
    }
}
