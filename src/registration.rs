//! # Agent Registration
//!
//! Registers the host with the server and owns the agent's [`Identity`].
//!
//! - [`Registrar`] performs one registration exchange; [`HttpRegistrar`] is the
//!   production implementation.
//! - [`RegistrationService::register_with_retry`] establishes the first identity
//!   at startup.
//! - [`RegistrationService::run`] answers re-registration signals from the
//!   consumer. It writes the new identity, releases the write lock, and only then
//!   sends the update notice, so a consumer reacting to the notice always reads
//!   the new identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::api::join_url;
use crate::config::{RegistrationConfig, ServerConfig};
use crate::consumer::ReregistrationSignal;
use crate::error::{AgentError, AgentResult};
use crate::identity::{Credentials, Identity, IdentityUpdate, SharedIdentity};
use crate::metadata::HostMetadata;

/// Version reported to the server
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid registration response: {0}")]
    InvalidResponse(String),

    #[error("Registration client configuration error: {0}")]
    Configuration(String),
}

pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Registration payload sent to the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistrationRequest {
    pub agent_version: String,
    pub host_name: String,
    pub assigned_hostname: String,
    #[serde(rename = "ProviderServerID")]
    pub provider_server_id: String,
    pub provider_server_type: String,
    pub platform: String,
    #[serde(rename = "PrivateIPAddress")]
    pub private_ip_address: String,
    #[serde(rename = "PrivateDNSName")]
    pub private_dns_name: String,
    #[serde(rename = "PublicIPAddress")]
    pub public_ip_address: String,
    #[serde(rename = "PublicDNSName")]
    pub public_dns_name: String,
    pub region: String,
    /// Agent start time, milliseconds since the epoch
    pub start_time: i64,
}

impl RegistrationRequest {
    pub fn from_metadata(metadata: &HostMetadata, start_time_ms: i64) -> Self {
        Self {
            agent_version: AGENT_VERSION.to_string(),
            host_name: metadata.hostname.clone(),
            assigned_hostname: metadata.assigned_hostname.clone(),
            provider_server_id: metadata.provider_id.clone(),
            provider_server_type: metadata.provider_type.clone(),
            platform: metadata.platform.clone(),
            private_ip_address: metadata.private_ip_address.clone(),
            private_dns_name: metadata.private_dns_name.clone(),
            public_ip_address: metadata.public_ip_address.clone(),
            public_dns_name: metadata.public_dns_name.clone(),
            region: metadata.region.clone(),
            start_time: start_time_ms,
        }
    }
}

/// Registration result returned by the server
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RegistrationInfo {
    #[serde(rename = "AgentID")]
    pub agent_id: String,
    pub create_time: i64,
    pub update_time: i64,
    pub action_queue_endpoint: String,
    #[serde(rename = "AWSAccessKey")]
    pub aws_access_key: String,
    #[serde(rename = "AWSSecretAccessKey")]
    pub aws_secret_access_key: String,
    #[serde(rename = "AWSSecurityToken")]
    pub aws_security_token: String,
}

impl fmt::Debug for RegistrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationInfo")
            .field("agent_id", &self.agent_id)
            .field("create_time", &self.create_time)
            .field("update_time", &self.update_time)
            .field("action_queue_endpoint", &self.action_queue_endpoint)
            .field("credentials", &"***")
            .finish()
    }
}

impl RegistrationInfo {
    /// Convert into an identity, rejecting incomplete responses
    pub fn into_identity(self) -> RegistrationResult<Identity> {
        if self.agent_id.is_empty() {
            return Err(RegistrationError::InvalidResponse(
                "missing AgentID".to_string(),
            ));
        }
        if self.action_queue_endpoint.is_empty() {
            return Err(RegistrationError::InvalidResponse(
                "missing ActionQueueEndpoint".to_string(),
            ));
        }

        let credentials = Credentials::new(
            self.aws_access_key,
            self.aws_secret_access_key,
            Some(self.aws_security_token),
        );
        if credentials.is_empty() {
            return Err(RegistrationError::InvalidResponse(
                "missing queue credentials".to_string(),
            ));
        }

        Ok(Identity::new(
            self.agent_id,
            self.action_queue_endpoint,
            credentials,
        ))
    }
}

/// One registration exchange with the server
#[async_trait]
pub trait Registrar: Send + Sync + fmt::Debug {
    async fn register(&self, request: &RegistrationRequest) -> RegistrationResult<RegistrationInfo>;
}

/// Registers over HTTPS with `reqwest`
pub struct HttpRegistrar {
    client: reqwest::Client,
    endpoint: String,
    url: String,
}

impl fmt::Debug for HttpRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The URL embeds the API key
        f.debug_struct("HttpRegistrar")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpRegistrar {
    pub fn new(config: &ServerConfig) -> RegistrationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                RegistrationError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            endpoint = %config.endpoint,
            timeout_ms = config.request_timeout_ms,
            "Created registration client"
        );

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            url: join_url(&config.endpoint, &["register", &config.api_key]),
        })
    }
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn register(&self, request: &RegistrationRequest) -> RegistrationResult<RegistrationInfo> {
        info!(
            endpoint = %self.endpoint,
            request = ?request,
            "Registering the agent"
        );

        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(status = %status, "Unexpected status from registration server");
            return Err(RegistrationError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let info: RegistrationInfo = response
            .json()
            .await
            .map_err(|e| RegistrationError::InvalidResponse(e.to_string()))?;

        info!(agent_id = %info.agent_id, "Successfully registered the agent");
        Ok(info)
    }
}

/// Delay schedule between registration attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub step: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// `min(attempt * step, max_delay)` for the 1-based `attempt` that failed
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max_delay)
    }
}

impl From<&RegistrationConfig> for RetryPolicy {
    fn from(config: &RegistrationConfig) -> Self {
        Self {
            step: config.retry_step(),
            max_delay: config.max_retry_delay(),
        }
    }
}

/// Owner of the agent identity
#[derive(Debug)]
pub struct RegistrationService {
    registrar: Arc<dyn Registrar>,
    request: RegistrationRequest,
    retry: RetryPolicy,
}

impl RegistrationService {
    pub fn new(
        registrar: Arc<dyn Registrar>,
        request: RegistrationRequest,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registrar,
            request,
            retry,
        }
    }

    /// Register until it succeeds
    ///
    /// Fails only with [`AgentError::ShutdownRequested`] when shutdown is
    /// signalled while waiting between attempts.
    pub async fn register_with_retry(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> AgentResult<Identity> {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return Err(AgentError::ShutdownRequested("registration".to_string()));
            }

            attempt = attempt.saturating_add(1);
            let result = self
                .registrar
                .register(&self.request)
                .await
                .and_then(RegistrationInfo::into_identity);

            let err = match result {
                Ok(identity) => {
                    info!(
                        agent_id = %identity.agent_id,
                        queue_endpoint = %identity.queue_endpoint,
                        attempts = attempt,
                        "Agent identity established"
                    );
                    return Ok(identity);
                }
                Err(e) => e,
            };

            let delay = self.retry.delay(attempt);
            error!(
                attempt,
                retry_in_ms = delay.as_millis(),
                error = %err,
                "Registration failed"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Err(AgentError::ShutdownRequested("registration".to_string()));
                    }
                }
            }
        }
    }

    /// Serve re-registration signals until shutdown or until the consumer
    /// drops its trigger sender
    pub async fn run(
        self,
        identity: SharedIdentity,
        mut triggers: mpsc::Receiver<ReregistrationSignal>,
        updates: mpsc::Sender<IdentityUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) -> AgentResult<()> {
        info!("Starting RegistrationService");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                signal = triggers.recv() => {
                    let Some(requested_at) = signal else {
                        info!("Re-registration channel closed");
                        break;
                    };

                    let mut coalesced = 0;
                    while triggers.try_recv().is_ok() {
                        coalesced += 1;
                    }
                    info!(
                        requested_at = %requested_at,
                        coalesced,
                        "Re-registration requested"
                    );

                    let new_identity = match self.register_with_retry(&mut shutdown).await {
                        Ok(identity) => identity,
                        Err(AgentError::ShutdownRequested(_)) => break,
                        Err(e) => return Err(e),
                    };
                    Self::publish(&identity, new_identity, &updates);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("RegistrationService stopped");
        Ok(())
    }

    /// Write the identity, then notify
    fn publish(
        identity: &SharedIdentity,
        new_identity: Identity,
        updates: &mpsc::Sender<IdentityUpdate>,
    ) {
        let notice = IdentityUpdate::new(new_identity.agent_id.clone());
        {
            let mut guard = identity.write();
            *guard = new_identity;
        }

        match updates.try_send(notice) {
            Ok(()) => debug!("Identity update published"),
            Err(TrySendError::Full(_)) => {
                debug!("Identity update already pending; consumer will read the latest identity")
            }
            Err(TrySendError::Closed(_)) => warn!("Identity update channel closed"),
        }
    }
}
