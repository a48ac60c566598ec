//! # SQS Queue Client
//!
//! [`QueueClient`] implementation on the official `aws-sdk-sqs` crate. Clients
//! are built from static credentials handed out by registration; the region is
//! derived from the queue endpoint.

use async_trait::async_trait;
use aws_sdk_sqs::config::{BehaviorVersion, Builder as SqsConfigBuilder, Credentials, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;
use std::sync::Arc;
use tracing::{debug, info};

use super::client::{QueueClient, QueueClientFactory};
use super::endpoint::QueueEndpoint;
use super::errors::{MessagingError, MessagingResult};
use super::message::{InboundMessage, PollRequest};
use crate::identity::Identity;

const CREDENTIALS_PROVIDER_NAME: &str = "runbook-agent-registration";

/// SQS-backed queue client bound to a single queue
#[derive(Debug, Clone)]
pub struct SqsQueueClient {
    client: Client,
    endpoint: QueueEndpoint,
}

impl SqsQueueClient {
    /// Build a client for the identity's queue
    pub fn new(identity: &Identity) -> MessagingResult<Self> {
        let endpoint = QueueEndpoint::parse(&identity.queue_endpoint)?;

        if identity.credentials.is_empty() {
            return Err(MessagingError::configuration(
                "sqs",
                "registration returned an empty access key or secret key",
            ));
        }

        let credentials = Credentials::new(
            identity.credentials.access_key_id.clone(),
            identity.credentials.secret_access_key.clone(),
            identity.credentials.session_token.clone(),
            None,
            CREDENTIALS_PROVIDER_NAME,
        );

        let mut builder = SqsConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(endpoint.region().to_string()))
            .credentials_provider(credentials);

        // Emulators are not reachable through the regional AWS endpoint
        if !endpoint.is_aws_hosted() {
            builder = builder.endpoint_url(endpoint.base_url());
        }

        info!(
            queue = %endpoint.url(),
            region = %endpoint.region(),
            "Initializing SQS client"
        );

        Ok(Self {
            client: Client::from_conf(builder.build()),
            endpoint,
        })
    }

    fn to_inbound(message: &aws_sdk_sqs::types::Message) -> InboundMessage {
        let attributes = message
            .message_attributes()
            .map(|attributes| {
                attributes
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .string_value()
                            .map(|value| (name.clone(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        InboundMessage {
            message_id: message.message_id().unwrap_or_default().to_string(),
            receipt_handle: message.receipt_handle().unwrap_or_default().to_string(),
            body: message.body().unwrap_or_default().to_string(),
            attributes,
        }
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn poll(&self, request: &PollRequest) -> MessagingResult<Vec<InboundMessage>> {
        debug!(queue = %self.endpoint.url(), "Polling SQS queue for messages");

        let mut receive = self
            .client
            .receive_message()
            .queue_url(self.endpoint.url())
            .max_number_of_messages(request.max_messages)
            .wait_time_seconds(request.wait_time_seconds)
            .visibility_timeout(request.visibility_timeout_seconds);

        for name in &request.attribute_names {
            receive = receive.message_attribute_names(name);
        }

        let output = receive.send().await.map_err(|e| {
            MessagingError::transport("receive_message", DisplayErrorContext(&e).to_string())
        })?;

        Ok(output.messages().iter().map(Self::to_inbound).collect())
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        timeout_seconds: i32,
    ) -> MessagingResult<()> {
        self.client
            .change_message_visibility()
            .queue_url(self.endpoint.url())
            .receipt_handle(receipt_handle)
            .visibility_timeout(timeout_seconds)
            .send()
            .await
            .map_err(|e| {
                MessagingError::transport(
                    "change_message_visibility",
                    DisplayErrorContext(&e).to_string(),
                )
            })?;
        Ok(())
    }

    async fn delete(&self, receipt_handle: &str) -> MessagingResult<()> {
        debug!(queue = %self.endpoint.url(), "Deleting message from SQS");

        self.client
            .delete_message()
            .queue_url(self.endpoint.url())
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| {
                MessagingError::transport("delete_message", DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }

    fn queue_url(&self) -> &str {
        self.endpoint.url()
    }

    fn client_type(&self) -> &'static str {
        "sqs"
    }
}

/// Factory producing [`SqsQueueClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SqsClientFactory;

impl QueueClientFactory for SqsClientFactory {
    fn build(&self, identity: &Identity) -> MessagingResult<Arc<dyn QueueClient>> {
        Ok(Arc::new(SqsQueueClient::new(identity)?))
    }
}
