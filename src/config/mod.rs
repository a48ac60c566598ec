//! # Agent Configuration
//!
//! Settings for every component of the agent. Values come from, in increasing
//! precedence: built-in defaults, the configuration file, `RUNBOOK_AGENT__*`
//! environment variables, and command-line overrides (see [`loader`]).

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{ConfigLoader, LoadOptions, ENV_PREFIX};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default configuration file name, looked up next to the executable
pub const DEFAULT_CONFIG_FILE_NAME: &str = "agent.json";
/// Default log file name
pub const DEFAULT_LOG_FILE_NAME: &str = "agent.log";
/// Default registration server endpoint
pub const DEFAULT_SERVER_ENDPOINT: &str = "localhost";

/// Largest batch a single receive call may return
pub const MAX_MESSAGES_PER_POLL: i32 = 10;
/// Longest long-poll wait the queue accepts
pub const MAX_WAIT_TIME_SECONDS: i32 = 20;
/// Longest visibility timeout the queue accepts (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: i32 = 43_200;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub agent: AgentSettings,
    pub consumer: ConsumerConfig,
    pub registration: RegistrationConfig,
    pub metadata: MetadataConfig,
    pub authenticator: AuthenticatorConfig,
}

/// Registration server connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host (and optional port) of the registration API
    pub endpoint: String,
    /// Account API key
    pub api_key: String,
    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SERVER_ENDPOINT.to_string(),
            api_key: String::new(),
            request_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Host-local agent settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Hostname reported instead of (alongside) the detected one
    pub assigned_hostname: String,
    /// Log file; relative paths resolve against the config file directory
    pub log_file: PathBuf,
    /// Debug-level logging
    pub debug_mode: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            assigned_hostname: String::new(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE_NAME),
            debug_mode: false,
        }
    }
}

/// Queue consumer loop tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Minimum time between the starts of two idle polling cycles
    pub poll_interval_ms: u64,
    /// Batch size per poll
    pub max_messages: i32,
    /// Long-poll wait
    pub wait_time_seconds: i32,
    /// Visibility timeout applied to every polled message
    pub visibility_timeout_seconds: i32,
    /// Added to an event's own timeout when extending its visibility
    pub visibility_buffer_seconds: i32,
    /// Consecutive poll failures before re-registration is requested
    pub failure_threshold: u32,
    /// Capacity of the event dispatch channel
    pub dispatch_capacity: usize,
    /// Capacity of the re-registration trigger channel
    pub trigger_capacity: usize,
    /// Capacity of the registration update channel
    pub update_capacity: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            max_messages: 10,
            wait_time_seconds: 20,
            visibility_timeout_seconds: 120,
            visibility_buffer_seconds: 2,
            failure_threshold: 10,
            dispatch_capacity: 10,
            trigger_capacity: 5,
            update_capacity: 5,
        }
    }
}

impl ConsumerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Registration retry behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Delay added per failed attempt
    pub retry_step_seconds: u64,
    /// Upper bound on the delay between attempts
    pub max_retry_delay_seconds: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            retry_step_seconds: 30,
            max_retry_delay_seconds: 300,
        }
    }
}

impl RegistrationConfig {
    pub fn retry_step(&self) -> Duration {
        Duration::from_secs(self.retry_step_seconds)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_seconds)
    }
}

/// Host metadata probes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Plain-text public IP echo service
    pub public_ip_url: String,
    /// Cloud instance metadata base URL
    pub cloud_metadata_url: String,
    /// Timeout per probe in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            public_ip_url: "http://ip.42.pl/raw".to_string(),
            cloud_metadata_url: "http://169.254.169.254/latest/meta-data".to_string(),
            probe_timeout_ms: 5000,
        }
    }
}

impl MetadataConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Message signature verification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticatorConfig {
    /// Base64-encoded Ed25519 public key of the signing server
    pub public_key: String,
}

impl AgentConfig {
    /// Validate the merged configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.api_key.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "server.api_key",
                "server configuration",
            ));
        }

        if self.server.endpoint.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "server.endpoint",
                "server configuration",
            ));
        }

        if self.authenticator.public_key.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "authenticator.public_key",
                "authenticator configuration",
            ));
        }

        let consumer = &self.consumer;
        if !(1..=MAX_MESSAGES_PER_POLL).contains(&consumer.max_messages) {
            return Err(ConfigurationError::invalid_value(
                "consumer.max_messages",
                consumer.max_messages.to_string(),
                format!("must be between 1 and {MAX_MESSAGES_PER_POLL}"),
            ));
        }

        if !(0..=MAX_WAIT_TIME_SECONDS).contains(&consumer.wait_time_seconds) {
            return Err(ConfigurationError::invalid_value(
                "consumer.wait_time_seconds",
                consumer.wait_time_seconds.to_string(),
                format!("must be between 0 and {MAX_WAIT_TIME_SECONDS}"),
            ));
        }

        if !(0..=MAX_VISIBILITY_TIMEOUT_SECONDS).contains(&consumer.visibility_timeout_seconds) {
            return Err(ConfigurationError::invalid_value(
                "consumer.visibility_timeout_seconds",
                consumer.visibility_timeout_seconds.to_string(),
                format!("must be between 0 and {MAX_VISIBILITY_TIMEOUT_SECONDS}"),
            ));
        }

        if consumer.visibility_buffer_seconds < 0 {
            return Err(ConfigurationError::invalid_value(
                "consumer.visibility_buffer_seconds",
                consumer.visibility_buffer_seconds.to_string(),
                "must not be negative",
            ));
        }

        if consumer.failure_threshold == 0 {
            return Err(ConfigurationError::invalid_value(
                "consumer.failure_threshold",
                "0",
                "must be greater than 0",
            ));
        }

        for (field, capacity) in [
            ("consumer.dispatch_capacity", consumer.dispatch_capacity),
            ("consumer.trigger_capacity", consumer.trigger_capacity),
            ("consumer.update_capacity", consumer.update_capacity),
        ] {
            if capacity == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "channel capacity must be greater than 0",
                ));
            }
        }

        if self.registration.retry_step_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "registration.retry_step_seconds",
                "0",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// JSON view of the configuration with secrets masked, for debug logging
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(server) = value.get_mut("server").and_then(|s| s.as_object_mut()) {
            if !self.server.api_key.is_empty() {
                server.insert(
                    "api_key".to_string(),
                    serde_json::Value::String("***REDACTED***".to_string()),
                );
            }
        }
        value
    }
}
