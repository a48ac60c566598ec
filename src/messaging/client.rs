use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use super::errors::MessagingResult;
use super::message::{InboundMessage, PollRequest};
use crate::identity::Identity;

/// Queue operations needed by the consumer
///
/// Implemented by the SQS adapter and by the in-memory client used in tests, so
/// the consumer never depends on a concrete backend.
#[async_trait]
pub trait QueueClient: Send + Sync + Debug {
    /// Long-poll one batch of messages
    async fn poll(&self, request: &PollRequest) -> MessagingResult<Vec<InboundMessage>>;

    /// Change how long a received message stays hidden from other consumers
    async fn change_visibility(
        &self,
        receipt_handle: &str,
        timeout_seconds: i32,
    ) -> MessagingResult<()>;

    /// Delete a received message
    async fn delete(&self, receipt_handle: &str) -> MessagingResult<()>;

    /// Queue this client is bound to
    fn queue_url(&self) -> &str;

    /// Client type for logging
    fn client_type(&self) -> &'static str;
}

/// Builds queue clients from an identity
///
/// Called once at startup and again after every credential rotation, so
/// implementations must be cheap and must not perform network I/O.
pub trait QueueClientFactory: Send + Sync + Debug {
    fn build(&self, identity: &Identity) -> MessagingResult<Arc<dyn QueueClient>>;
}
