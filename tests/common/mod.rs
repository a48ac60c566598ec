#![allow(dead_code)]

pub mod strategies;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use runbook_agent::config::ConsumerConfig;
use runbook_agent::messaging::{AGENT_ID_ATTRIBUTE, SIGNATURE_ATTRIBUTE};
use runbook_agent::{
    CollaboratorChannels, ConsumerChannels, Credentials, Ed25519Authenticator, Event, Identity,
    InMemoryClientFactory, InMemoryQueueClient, InboundMessage, QueueConsumer, SharedIdentity,
};

pub const AGENT_ID: &str = "123456789";
pub const QUEUE_URL: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/agent-actions";

/// Generous bound for anything that should happen "immediately"
pub const PROMPTLY: Duration = Duration::from_secs(2);

pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

pub fn authenticator() -> Arc<Ed25519Authenticator> {
    let public_key = STANDARD.encode(signing_key().verifying_key().to_bytes());
    Arc::new(Ed25519Authenticator::from_base64(&public_key).expect("valid test key"))
}

pub fn sign(body: &str) -> String {
    STANDARD.encode(signing_key().sign(body.as_bytes()).to_bytes())
}

pub fn identity(agent_id: &str) -> Identity {
    Identity::new(
        agent_id,
        QUEUE_URL,
        Credentials::new("AKIATESTKEY", "test-secret", None),
    )
}

/// Event body addressed to `agent_id`
pub fn event_body(agent_id: &str, timeout: i32) -> String {
    let event = Event {
        timestamp: 1_500_000_000_000,
        source: "console".to_string(),
        hostname: "web-01".to_string(),
        action_type: "runbook".to_string(),
        event_id: "evt-1".to_string(),
        agent_id: agent_id.to_string(),
        rule_id: "rule-1".to_string(),
        runbook_name: "restart-nginx".to_string(),
        raw_command: "systemctl restart nginx".to_string(),
        timeout,
        ..Default::default()
    };
    event.to_body().expect("event encodes")
}

/// Correctly signed message whose attribute names `agent_id`
pub fn signed_message(id: &str, agent_id: &str, body: &str) -> InboundMessage {
    InboundMessage::new(format!("msg-{id}"), format!("rcpt-{id}"), body)
        .with_attribute(AGENT_ID_ATTRIBUTE, agent_id)
        .with_attribute(SIGNATURE_ATTRIBUTE, sign(body))
}

pub fn fast_config() -> ConsumerConfig {
    ConsumerConfig {
        poll_interval_ms: 10,
        failure_threshold: 3,
        ..Default::default()
    }
}

/// A consumer wired to an in-memory queue, with every collaborator end exposed
pub struct ConsumerHarness {
    pub consumer: QueueConsumer,
    pub client: Arc<InMemoryQueueClient>,
    pub factory: Arc<InMemoryClientFactory>,
    pub identity: SharedIdentity,
    pub collaborators: CollaboratorChannels,
    pub shutdown: watch::Sender<bool>,
}

impl ConsumerHarness {
    pub fn new(config: ConsumerConfig) -> Self {
        let client = Arc::new(InMemoryQueueClient::new(QUEUE_URL));
        let factory = Arc::new(InMemoryClientFactory::new(Arc::clone(&client)));
        let identity = identity(AGENT_ID).into_shared();
        let (channels, collaborators) = ConsumerChannels::bounded(&config);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let consumer = QueueConsumer::new(
            config,
            Arc::clone(&identity),
            factory.clone(),
            authenticator(),
            channels,
            shutdown_rx,
        )
        .expect("consumer builds");

        Self {
            consumer,
            client,
            factory,
            identity,
            collaborators,
            shutdown,
        }
    }
}
