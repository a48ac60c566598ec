//! Error types for the runbook agent.
//!

use thiserror::Error;

use crate::auth::AuthenticationError;
use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::registration::RegistrationError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),
    #[error("Host metadata error: {0}")]
    Metadata(String),
    #[error("Logging setup error: {0}")]
    Logging(String),
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
    #[error("Shutdown requested during {0}")]
    ShutdownRequested(String),
}

impl AgentError {
    /// Whether the owning process must stop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        match self {
            AgentError::Configuration(_) | AgentError::Authentication(_) => true,
            AgentError::Messaging(e) => e.is_fatal(),
            AgentError::ChannelClosed(_) => true,
            AgentError::Registration(_)
            | AgentError::Metadata(_)
            | AgentError::Logging(_)
            | AgentError::ShutdownRequested(_) => false,
        }
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
