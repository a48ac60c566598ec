//! # Messaging Error Types
//!
//! Structured errors for queue operations using thiserror.

use thiserror::Error;

/// Queue messaging errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Queue operation failed: {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("Invalid queue endpoint: {endpoint} (expected <protocol>://sqs.<region>.<domain>/<path>)")]
    InvalidEndpoint { endpoint: String },

    #[error("Message deserialization error: {message}")]
    Decode { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },
}

impl MessagingError {
    /// Create a transport error for a failed queue call
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid endpoint error
    pub fn invalid_endpoint(endpoint: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
        }
    }

    /// Create a message decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Transport failures are retried on the next cycle; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Errors that must stop the consumer rather than spin.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidEndpoint { .. } | Self::Configuration { .. }
        )
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(error: serde_json::Error) -> Self {
        Self::decode(error.to_string())
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;
