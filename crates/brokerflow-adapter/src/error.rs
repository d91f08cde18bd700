//! Error types for the adapter

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors that can occur while pumping messages
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Missing or invalid startup configuration. Fatal, the process does
    /// not come up.
    #[error("configuration error: {0}")]
    Config(String),

    /// Broker dial or session establishment failed. Fatal to this instance;
    /// recovery is a supervised restart.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// The receiving link failed or closed. Fatal to this instance.
    #[error("receive error: {0}")]
    Receive(String),

    /// One event's downstream POST failed. Local to the current delivery:
    /// reject and continue.
    #[error("event delivery failed: {0}")]
    Delivery(String),

    /// A terminal disposition could not be committed. The channel is no
    /// longer trustworthy, so this is fatal.
    #[error("disposition error: {0}")]
    Disposition(String),

    /// Shutdown requested
    #[error("shutdown requested")]
    Shutdown,
}

impl AdapterError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Whether this error terminates the pump. Delivery failures never do.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Connection(_) | Self::Receive(_) | Self::Disposition(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdapterError::delivery("sink returned 500");
        assert_eq!(err.to_string(), "event delivery failed: sink returned 500");
    }

    #[test]
    fn test_fatality() {
        assert!(AdapterError::connection("dial failed").is_fatal());
        assert!(AdapterError::Receive("link closed".to_string()).is_fatal());
        assert!(AdapterError::Disposition("channel gone".to_string()).is_fatal());
        assert!(!AdapterError::delivery("timeout").is_fatal());
        assert!(!AdapterError::Shutdown.is_fatal());
    }
}
