#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Runbook Agent
//!
//! Host-resident agent that consumes signed runbook action requests from a
//! managed message queue.
//!
//! ## Overview
//!
//! The agent registers its host with the server and receives an identity: an
//! agent id, the URL of its action queue, and credentials for that queue. The
//! consumer then long-polls the queue, keeps only messages addressed to this
//! agent, verifies their signatures, and hands decoded [`Event`]s to the runbook
//! pipeline over a bounded channel.
//!
//! When polling keeps failing (typically expired credentials) the consumer asks
//! the registration service for a new identity and rebuilds its queue client
//! once the update arrives.
//!
//! ## Module Organization
//!
//! - [`consumer`] - Polling loop, message admission and failure escalation
//! - [`messaging`] - Queue client trait, SQS adapter, in-memory client, wire types
//! - [`registration`] - Server registration and identity ownership
//! - [`auth`] - Message signature verification
//! - [`identity`] - Agent identity and the shared handle
//! - [`metadata`] - Host facts reported at registration
//! - [`config`] - Layered configuration
//! - [`logging`] - Console and rolling-file tracing setup
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use runbook_agent::{
//!     AgentConfig, ConsumerChannels, Ed25519Authenticator, Identity, QueueConsumer,
//!     SqsClientFactory,
//! };
//!
//! # async fn example(config: AgentConfig, identity: Identity) -> Result<(), Box<dyn std::error::Error>> {
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let (channels, mut collaborators) = ConsumerChannels::bounded(&config.consumer);
//!
//! let mut consumer = QueueConsumer::new(
//!     config.consumer.clone(),
//!     identity.into_shared(),
//!     Arc::new(SqsClientFactory),
//!     Arc::new(Ed25519Authenticator::from_base64(&config.authenticator.public_key)?),
//!     channels,
//!     shutdown_rx,
//! )?;
//!
//! tokio::spawn(async move { consumer.run().await });
//! while let Some(event) = collaborators.events.recv().await {
//!     println!("runbook requested: {}", event.runbook_name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod consumer;
pub mod error;
pub mod identity;
pub mod logging;
pub mod messaging;
pub mod metadata;
pub mod registration;

pub use auth::{AuthenticationError, Ed25519Authenticator, MessageAuthenticator};
pub use config::{AgentConfig, ConfigLoader, ConfigurationError, LoadOptions};
pub use consumer::{
    CollaboratorChannels, ConsumerChannels, ConsumerStats, ConsumerStatsSnapshot, CycleOutcome,
    QueueConsumer, ReregistrationSignal,
};
pub use error::{AgentError, AgentResult};
pub use identity::{Credentials, Identity, IdentityUpdate, SharedIdentity};
pub use logging::{init_logging, LoggingOptions};
pub use messaging::{
    Event, InMemoryClientFactory, InMemoryQueueClient, InboundMessage, MessagingError,
    QueueClient, QueueClientFactory, SqsClientFactory,
};
pub use metadata::HostMetadata;
pub use registration::{
    HttpRegistrar, Registrar, RegistrationError, RegistrationRequest, RegistrationService,
    RetryPolicy,
};
