//! # Messaging Module
//!
//! Queue access for the agent: the backend-neutral client trait, the SQS
//! adapter, the in-memory test client, and the message and event types.

pub mod client;
pub mod endpoint;
pub mod errors;
pub mod event;
pub mod in_memory_client;
pub mod message;
pub mod sqs_client;

pub use client::{QueueClient, QueueClientFactory};
pub use endpoint::QueueEndpoint;
pub use errors::{MessagingError, MessagingResult};
pub use event::Event;
pub use in_memory_client::{InMemoryClientFactory, InMemoryQueueClient, QueueOperation};
pub use message::{InboundMessage, PollRequest, AGENT_ID_ATTRIBUTE, SIGNATURE_ATTRIBUTE};
pub use sqs_client::{SqsClientFactory, SqsQueueClient};
