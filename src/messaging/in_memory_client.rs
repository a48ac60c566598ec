//! # In-Memory Queue Client
//!
//! Deterministic [`QueueClient`] used by unit and integration tests.
//!
//! - Serves pre-loaded batches in order, then empty polls
//! - Injects a configurable number of poll failures
//! - Records every poll, visibility change and delete for assertions
//!
//! The matching [`InMemoryClientFactory`] validates endpoints the same way the
//! SQS factory does and hands out a single shared client, so a test can keep a
//! handle on the queue across client rebuilds.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::client::{QueueClient, QueueClientFactory};
use super::endpoint::QueueEndpoint;
use super::errors::{MessagingError, MessagingResult};
use super::message::{InboundMessage, PollRequest};
use crate::identity::Identity;

/// A recorded queue call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOperation {
    Poll(PollRequest),
    ChangeVisibility {
        receipt_handle: String,
        timeout_seconds: i32,
    },
    Delete {
        receipt_handle: String,
    },
}

#[derive(Debug, Default)]
struct InMemoryState {
    batches: VecDeque<Vec<InboundMessage>>,
    pending_poll_failures: usize,
    fail_message_operations: bool,
    operations: Vec<QueueOperation>,
}

/// In-memory client implementation for testing
#[derive(Debug)]
pub struct InMemoryQueueClient {
    queue_url: String,
    state: Mutex<InMemoryState>,
}

impl InMemoryQueueClient {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            state: Mutex::new(InMemoryState::default()),
        }
    }

    /// Queue a batch to be returned by a future poll
    pub fn push_batch(&self, batch: Vec<InboundMessage>) {
        self.state.lock().batches.push_back(batch);
    }

    /// Make the next `count` polls fail with a transport error
    pub fn fail_next_polls(&self, count: usize) {
        self.state.lock().pending_poll_failures = count;
    }

    /// Make visibility changes and deletes fail
    pub fn fail_message_operations(&self, fail: bool) {
        self.state.lock().fail_message_operations = fail;
    }

    /// All recorded calls, in order
    pub fn operations(&self) -> Vec<QueueOperation> {
        self.state.lock().operations.clone()
    }

    /// Recorded calls other than polls
    pub fn message_operations(&self) -> Vec<QueueOperation> {
        self.operations()
            .into_iter()
            .filter(|op| !matches!(op, QueueOperation::Poll(_)))
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.state
            .lock()
            .operations
            .iter()
            .filter(|op| matches!(op, QueueOperation::Poll(_)))
            .count()
    }

    pub fn clear_operations(&self) {
        self.state.lock().operations.clear();
    }

    fn record_message_operation(&self, operation: QueueOperation) -> MessagingResult<()> {
        let mut state = self.state.lock();
        let fail = state.fail_message_operations;
        let name = match &operation {
            QueueOperation::ChangeVisibility { .. } => "change_visibility",
            QueueOperation::Delete { .. } => "delete",
            QueueOperation::Poll(_) => "poll",
        };
        state.operations.push(operation);

        if fail {
            return Err(MessagingError::transport(name, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn poll(&self, request: &PollRequest) -> MessagingResult<Vec<InboundMessage>> {
        let mut state = self.state.lock();
        state.operations.push(QueueOperation::Poll(request.clone()));

        if state.pending_poll_failures > 0 {
            state.pending_poll_failures -= 1;
            return Err(MessagingError::transport("poll", "injected failure"));
        }

        let mut batch = state.batches.pop_front().unwrap_or_default();
        batch.truncate(request.max_messages.max(0) as usize);
        Ok(batch)
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        timeout_seconds: i32,
    ) -> MessagingResult<()> {
        self.record_message_operation(QueueOperation::ChangeVisibility {
            receipt_handle: receipt_handle.to_string(),
            timeout_seconds,
        })
    }

    async fn delete(&self, receipt_handle: &str) -> MessagingResult<()> {
        self.record_message_operation(QueueOperation::Delete {
            receipt_handle: receipt_handle.to_string(),
        })
    }

    fn queue_url(&self) -> &str {
        &self.queue_url
    }

    fn client_type(&self) -> &'static str {
        "in_memory"
    }
}

/// Factory handing out one shared [`InMemoryQueueClient`]
#[derive(Debug)]
pub struct InMemoryClientFactory {
    client: Arc<InMemoryQueueClient>,
    builds: AtomicUsize,
    built_for: Mutex<Vec<Identity>>,
}

impl InMemoryClientFactory {
    pub fn new(client: Arc<InMemoryQueueClient>) -> Self {
        Self {
            client,
            builds: AtomicUsize::new(0),
            built_for: Mutex::new(Vec::new()),
        }
    }

    pub fn client(&self) -> Arc<InMemoryQueueClient> {
        Arc::clone(&self.client)
    }

    /// Number of clients built so far
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Identities the clients were built from, in order
    pub fn built_for(&self) -> Vec<Identity> {
        self.built_for.lock().clone()
    }
}

impl QueueClientFactory for InMemoryClientFactory {
    fn build(&self, identity: &Identity) -> MessagingResult<Arc<dyn QueueClient>> {
        QueueEndpoint::parse(&identity.queue_endpoint)?;

        self.builds.fetch_add(1, Ordering::SeqCst);
        self.built_for.lock().push(identity.clone());
        let client: Arc<dyn QueueClient> = self.client.clone();
        Ok(client)
    }
}
