//! SBI Error Types
//!
//! Error types for the SBI library

use thiserror::Error;

/// SBI Error type
#[derive(Error, Debug)]
pub enum SbiError {
    /// Empty or malformed target address, never retried
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    /// No client handle could be produced for the target
    #[error("NFManagement client unavailable: {0}")]
    ClientUnavailable(String),

    /// HTTP/2 connection error
    #[error("HTTP/2 connection error: {0}")]
    ConnectionError(String),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Invalid URI
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Invalid method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP error with status code
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    /// Invalid response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Operation abandoned because its context was cancelled
    #[error("NF registration stopped due to context cancel, retry time: {attempt}")]
    Cancelled { attempt: usize },

    /// Retry bound reached without a successful registration
    #[error("NF registration failed, maximum retry time reached [{attempts}]")]
    RegistrationExhausted { attempts: usize },

    /// DeregisterNFInstance failed; wraps the underlying call error
    #[error("Deregister NF instance {nf_instance_id} error: {source}")]
    DeregistrationFailed {
        nf_instance_id: String,
        #[source]
        source: Box<SbiError>,
    },

    /// Listener could not bind
    #[error("Failed to bind {addr}: {source}")]
    BindError {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A bounded shutdown step did not complete in time
    #[error("{0} did not complete within timeout")]
    ShutdownTimeout(&'static str),

    /// Server error
    #[error("Server error: {0}")]
    ServerError(String),

    /// Client error
    #[error("Client error: {0}")]
    ClientError(String),

    /// TLS/SSL error
    #[error("TLS error: {0}")]
    TlsError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Hyper error
    #[error("Hyper error: {0}")]
    HyperError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SbiError {
    /// Create an HTTP error from status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpError {
            status,
            message: message.into(),
        }
    }

    /// Get the HTTP status code if this is an HTTP error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpError { status, .. } => Some(*status),
            Self::Timeout => Some(408),
            _ => None,
        }
    }

    /// Network or remote-protocol failure during a single attempt.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_)
                | Self::Timeout
                | Self::HttpError { .. }
                | Self::HyperError(_)
                | Self::InvalidResponse(_)
                | Self::TlsError(_)
                | Self::IoError(_)
        )
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        self.is_transport()
    }
}

/// Result type for SBI operations
pub type SbiResult<T> = Result<T, SbiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code() {
        let err = SbiError::from_status(404, "Not found");
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(SbiError::Timeout.status_code(), Some(408));
        assert_eq!(SbiError::InvalidAddress(String::new()).status_code(), None);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SbiError::Timeout.is_retryable());
        assert!(SbiError::ConnectionError("refused".to_string()).is_retryable());
        assert!(SbiError::from_status(503, "busy").is_retryable());
        assert!(!SbiError::InvalidAddress(String::new()).is_retryable());
        assert!(!SbiError::ClientUnavailable("nil".to_string()).is_retryable());
        assert!(!SbiError::Cancelled { attempt: 0 }.is_retryable());
    }

    #[test]
    fn test_error_messages_name_attempts() {
        let err = SbiError::RegistrationExhausted { attempts: 3 };
        assert!(err.to_string().contains("[3]"));

        let err = SbiError::Cancelled { attempt: 2 };
        assert!(err.to_string().ends_with("retry time: 2"));

        let err = SbiError::DeregistrationFailed {
            nf_instance_id: "abc".to_string(),
            source: Box::new(SbiError::Timeout),
        };
        assert_eq!(err.to_string(), "Deregister NF instance abc error: Request timeout");
        assert!(std::error::Error::source(&err).is_some());
    }
}
