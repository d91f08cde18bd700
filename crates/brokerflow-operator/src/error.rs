//! Error types for the brokerflow operator

use thiserror::Error;

/// Errors that can occur during operator operations
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Missing or invalid startup configuration. Fatal, the process does not
    /// come up.
    #[error("configuration error: {0}")]
    Config(String),

    /// Sink reference could not be resolved
    #[error("sink resolution failed: {0}")]
    Resolution(String),

    /// Workload lookup or create failed against the store
    #[error("workload store error: {0}")]
    Store(String),

    /// Create raced with a concurrent reconcile; the existing workload wins
    #[error("workload already exists: {0}")]
    AlreadyExists(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reconciliation failed
    #[error("reconciliation failed: {0}")]
    Reconcile(String),
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperatorError::Kube(_)
                | OperatorError::Resolution(_)
                | OperatorError::Store(_)
                | OperatorError::Reconcile(_)
        )
    }

    /// Suggested requeue delay for retryable errors
    pub fn requeue_delay(&self) -> Option<std::time::Duration> {
        if self.is_retryable() {
            Some(std::time::Duration::from_secs(30))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OperatorError::Resolution("service ns/svc not found".to_string());
        assert!(err.to_string().contains("sink resolution failed"));
        assert!(err.to_string().contains("ns/svc"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(OperatorError::Resolution("test".to_string()).is_retryable());
        assert!(OperatorError::Store("test".to_string()).is_retryable());
        assert!(!OperatorError::Config("test".to_string()).is_retryable());
        assert!(!OperatorError::AlreadyExists("test".to_string()).is_retryable());
    }

    #[test]
    fn test_requeue_delay() {
        assert!(OperatorError::Store("test".to_string()).requeue_delay().is_some());
        assert!(OperatorError::Config("test".to_string()).requeue_delay().is_none());
    }
}
