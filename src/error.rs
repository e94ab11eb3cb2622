//! Error types for the qm queue manager.

use thiserror::Error;

/// The main error type for the qm library.
#[derive(Error, Debug)]
pub enum QmError {
    /// The process-wide manager was requested before one was created.
    #[error("Queue manager is not initialized")]
    Uninitialized,

    /// Redis connection or operation error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, such as waiting on a shutdown signal.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown backend component name.
    #[error("Unknown backend component: {0}")]
    UnknownComponent(String),

    /// Backend-specific error.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias using QmError.
pub type Result<T> = std::result::Result<T, QmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_uninitialized() {
        let err = QmError::Uninitialized;
        assert_eq!(format!("{}", err), "Queue manager is not initialized");
    }

    #[test]
    fn test_error_display_unknown_component() {
        let err = QmError::UnknownComponent("FlowProducer".to_string());
        assert_eq!(format!("{}", err), "Unknown backend component: FlowProducer");
    }

    #[test]
    fn test_error_display_config() {
        let err = QmError::Config("invalid port".to_string());
        assert_eq!(format!("{}", err), "Configuration error: invalid port");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: QmError = json_err.into();
        assert!(matches!(err, QmError::Serialization(_)));
    }

    #[test]
    fn test_error_from_io() {
        let err: QmError = std::io::Error::new(std::io::ErrorKind::Interrupted, "signal").into();
        assert_eq!(format!("{}", err), "IO error: signal");
    }

    #[test]
    fn test_error_from_redis() {
        let redis_err = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        let err: QmError = redis_err.into();
        assert!(matches!(err, QmError::Redis(_)));
        assert!(format!("{}", err).starts_with("Redis error:"));
    }
}
