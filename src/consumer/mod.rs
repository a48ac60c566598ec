//! # Queue Consumer
//!
//! The polling loop that turns queue messages into dispatched [`Event`]s.
//!
//! Each cycle, in priority order:
//!
//! 1. A pending identity update rebuilds the queue client; nothing is polled.
//! 2. Otherwise one batch is long-polled and every message goes through
//!    [`admission::evaluate`].
//! 3. A cycle that dispatched nothing sleeps out the rest of the poll interval.
//!    A cycle that dispatched something loops immediately so a backlog drains.
//!
//! Shutdown also cuts short a dispatch blocked on a full event channel. The
//! blocked message and the rest of its batch are released back to the queue.
//!
//! Consecutive poll failures are tracked by [`FailureTracker`]; reaching the
//! threshold sends one re-registration signal on the trigger channel.

pub mod admission;
pub mod failure;
pub mod stats;

pub use admission::{Disposition, RejectReason};
pub use failure::{FailureRecord, FailureTracker};
pub use stats::{ConsumerStats, ConsumerStatsSnapshot};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::MessageAuthenticator;
use crate::config::ConsumerConfig;
use crate::error::{AgentError, AgentResult};
use crate::identity::{IdentityUpdate, SharedIdentity};
use crate::messaging::{
    Event, InboundMessage, MessagingError, PollRequest, QueueClient, QueueClientFactory,
};

/// Re-registration request: the time the consumer gave up on its credentials
pub type ReregistrationSignal = DateTime<Utc>;

/// Channel ends owned by the consumer
#[derive(Debug)]
pub struct ConsumerChannels {
    /// Validated events for the runbook pipeline
    pub events: mpsc::Sender<Event>,
    /// Re-registration requests for the registration service
    pub triggers: mpsc::Sender<ReregistrationSignal>,
    /// Identity update notices from the registration service
    pub updates: mpsc::Receiver<IdentityUpdate>,
}

/// The opposite ends, held by the pipeline and the registration service
#[derive(Debug)]
pub struct CollaboratorChannels {
    pub events: mpsc::Receiver<Event>,
    pub triggers: mpsc::Receiver<ReregistrationSignal>,
    pub updates: mpsc::Sender<IdentityUpdate>,
}

impl ConsumerChannels {
    /// Create the three bounded channels sized from `config`
    pub fn bounded(config: &ConsumerConfig) -> (Self, CollaboratorChannels) {
        let (events_tx, events_rx) = mpsc::channel(config.dispatch_capacity);
        let (triggers_tx, triggers_rx) = mpsc::channel(config.trigger_capacity);
        let (updates_tx, updates_rx) = mpsc::channel(config.update_capacity);

        (
            Self {
                events: events_tx,
                triggers: triggers_tx,
                updates: updates_rx,
            },
            CollaboratorChannels {
                events: events_rx,
                triggers: triggers_rx,
                updates: updates_tx,
            },
        )
    }
}

/// Result of one [`QueueConsumer::run_cycle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// An identity update was applied instead of polling
    ClientRebuilt,
    /// Poll succeeded
    Polled { received: usize, dispatched: usize },
    /// Poll failed; `escalated` when a re-registration was requested
    PollFailed { escalated: bool },
    /// Shutdown arrived while a dispatch was blocked; the rest of the batch was released
    Interrupted { received: usize, dispatched: usize },
}

impl CycleOutcome {
    /// Whether the loop should sleep before the next cycle
    pub fn is_idle(&self) -> bool {
        match self {
            CycleOutcome::ClientRebuilt => false,
            CycleOutcome::Polled { dispatched, .. } => *dispatched == 0,
            CycleOutcome::PollFailed { .. } => true,
            CycleOutcome::Interrupted { .. } => false,
        }
    }
}

/// What happened to one message of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handled {
    Dispatched,
    /// Released, deleted or skipped
    Settled,
    /// Dispatch abandoned for shutdown; the batch stops here
    Interrupted,
}

/// Resolves once shutdown is signalled or its sender is dropped
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    loop {
        if shutdown.changed().await.is_err() || *shutdown.borrow_and_update() {
            return;
        }
    }
}

/// Queue consumer bound to the agent's current identity
pub struct QueueConsumer {
    consumer_id: Uuid,
    config: ConsumerConfig,
    poll_request: PollRequest,
    identity: SharedIdentity,
    factory: Arc<dyn QueueClientFactory>,
    authenticator: Arc<dyn MessageAuthenticator>,
    client: Arc<dyn QueueClient>,
    /// Agent id the current client was built for
    agent_id: String,
    channels: ConsumerChannels,
    failures: FailureTracker,
    updates_disconnected: bool,
    shutdown: watch::Receiver<bool>,
    stats: Arc<ConsumerStats>,
}

impl std::fmt::Debug for QueueConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("consumer_id", &self.consumer_id)
            .field("agent_id", &self.agent_id)
            .field("queue_url", &self.client.queue_url())
            .field("client_type", &self.client.client_type())
            .field("consecutive_failures", &self.failures.consecutive())
            .finish()
    }
}

impl QueueConsumer {
    /// Create a consumer and build its first queue client
    ///
    /// Fails when the identity's endpoint or credentials cannot produce a
    /// client; that is a configuration problem and is not retried.
    pub fn new(
        config: ConsumerConfig,
        identity: SharedIdentity,
        factory: Arc<dyn QueueClientFactory>,
        authenticator: Arc<dyn MessageAuthenticator>,
        channels: ConsumerChannels,
        shutdown: watch::Receiver<bool>,
    ) -> AgentResult<Self> {
        let consumer_id = Uuid::new_v4();
        let current = identity.read().clone();
        let client = factory.build(&current)?;

        let poll_request = PollRequest::new(
            config.max_messages,
            config.wait_time_seconds,
            config.visibility_timeout_seconds,
        );

        info!(
            consumer_id = %consumer_id,
            agent_id = %current.agent_id,
            queue_url = %client.queue_url(),
            client_type = client.client_type(),
            poll_interval = ?config.poll_interval(),
            "Creating QueueConsumer"
        );

        Ok(Self {
            consumer_id,
            failures: FailureTracker::new(config.failure_threshold),
            config,
            poll_request,
            identity,
            factory,
            authenticator,
            client,
            agent_id: current.agent_id,
            channels,
            updates_disconnected: false,
            shutdown,
            stats: Arc::new(ConsumerStats::default()),
        })
    }

    /// Run cycles until shutdown is signalled
    ///
    /// Returns an error only for conditions the loop cannot recover from: a
    /// rebuilt identity that yields no client, or a closed dispatch channel.
    pub async fn run(&mut self) -> AgentResult<()> {
        info!(consumer_id = %self.consumer_id, "Starting QueueConsumer");

        loop {
            if self.shutdown_requested() {
                break;
            }

            let cycle_start = Instant::now();
            let outcome = self.run_cycle().await?;

            debug!(
                consumer_id = %self.consumer_id,
                outcome = ?outcome,
                duration_ms = cycle_start.elapsed().as_millis(),
                "Completed consumer cycle"
            );

            if let CycleOutcome::Interrupted { .. } = outcome {
                break;
            }
            if !outcome.is_idle() {
                continue;
            }

            let remaining = self
                .config
                .poll_interval()
                .saturating_sub(cycle_start.elapsed());
            if remaining.is_zero() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        info!(consumer_id = %self.consumer_id, "Shutdown sender dropped");
                        break;
                    }
                }
            }
        }

        info!(
            consumer_id = %self.consumer_id,
            stats = ?self.stats.snapshot(),
            "QueueConsumer stopped"
        );
        Ok(())
    }

    /// Execute a single cycle without pacing
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use tokio::sync::watch;
    /// use runbook_agent::config::ConsumerConfig;
    /// use runbook_agent::{
    ///     ConsumerChannels, CycleOutcome, Credentials, Ed25519Authenticator, Identity,
    ///     InMemoryClientFactory, InMemoryQueueClient, QueueConsumer,
    /// };
    ///
    /// # tokio_test::block_on(async {
    /// let queue_url = "https://sqs.us-east-1.amazonaws.com/123456789012/agent-actions";
    /// let client = Arc::new(InMemoryQueueClient::new(queue_url));
    /// let identity = Identity::new("123456789", queue_url, Credentials::new("AKIA", "secret", None));
    /// let signing_key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
    ///
    /// let config = ConsumerConfig::default();
    /// let (channels, _collaborators) = ConsumerChannels::bounded(&config);
    /// let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    /// let mut consumer = QueueConsumer::new(
    ///     config,
    ///     identity.into_shared(),
    ///     Arc::new(InMemoryClientFactory::new(client)),
    ///     Arc::new(Ed25519Authenticator::new(signing_key.verifying_key())),
    ///     channels,
    ///     shutdown_rx,
    /// )
    /// .unwrap();
    ///
    /// // Nothing queued: one empty poll
    /// let outcome = consumer.run_cycle().await.unwrap();
    /// assert_eq!(outcome, CycleOutcome::Polled { received: 0, dispatched: 0 });
    /// assert!(outcome.is_idle());
    /// # });
    /// ```
    pub async fn run_cycle(&mut self) -> AgentResult<CycleOutcome> {
        ConsumerStats::increment(&self.stats.cycles);

        if self.take_pending_update() {
            self.rebuild_client()?;
            return Ok(CycleOutcome::ClientRebuilt);
        }

        let messages = match self.client.poll(&self.poll_request).await {
            Ok(messages) => messages,
            Err(e) => {
                let escalated = self.handle_poll_failure(&e);
                return Ok(CycleOutcome::PollFailed { escalated });
            }
        };

        let ended_run = self.failures.record_success();
        if ended_run > 0 {
            info!(
                consumer_id = %self.consumer_id,
                failed_polls = ended_run,
                "Polling recovered"
            );
        }

        let received = messages.len();
        self.stats
            .messages_received
            .fetch_add(received as u64, std::sync::atomic::Ordering::Relaxed);

        let mut dispatched = 0;
        let mut pending = messages.into_iter();
        while let Some(message) = pending.next() {
            match self.admit(message).await {
                Ok(Handled::Dispatched) => dispatched += 1,
                Ok(Handled::Settled) => {}
                Ok(Handled::Interrupted) => {
                    self.release_all(pending).await;
                    return Ok(CycleOutcome::Interrupted {
                        received,
                        dispatched,
                    });
                }
                Err(e) => {
                    self.release_all(pending).await;
                    return Err(e);
                }
            }
        }

        Ok(CycleOutcome::Polled {
            received,
            dispatched,
        })
    }

    /// Drain queued update notices; true when at least one was pending
    fn take_pending_update(&mut self) -> bool {
        let mut pending = false;
        loop {
            match self.channels.updates.try_recv() {
                Ok(update) => {
                    debug!(
                        consumer_id = %self.consumer_id,
                        agent_id = %update.agent_id,
                        updated_at = %update.updated_at,
                        "Received identity update"
                    );
                    pending = true;
                }
                Err(TryRecvError::Empty) => return pending,
                Err(TryRecvError::Disconnected) => {
                    if !self.updates_disconnected {
                        warn!(
                            consumer_id = %self.consumer_id,
                            "Identity update channel closed; continuing with current client"
                        );
                        self.updates_disconnected = true;
                    }
                    return pending;
                }
            }
        }
    }

    fn rebuild_client(&mut self) -> AgentResult<()> {
        let current = self.identity.read().clone();
        let client = self.factory.build(&current).map_err(|e| {
            error!(
                consumer_id = %self.consumer_id,
                endpoint = %current.queue_endpoint,
                error = %e,
                "Failed to rebuild queue client from updated identity"
            );
            AgentError::from(e)
        })?;

        info!(
            consumer_id = %self.consumer_id,
            previous_agent_id = %self.agent_id,
            agent_id = %current.agent_id,
            queue_url = %client.queue_url(),
            "Rebuilt queue client"
        );

        self.client = client;
        self.agent_id = current.agent_id;
        ConsumerStats::increment(&self.stats.client_rebuilds);
        Ok(())
    }

    /// Count a failed poll; returns true when re-registration was requested
    fn handle_poll_failure(&mut self, err: &MessagingError) -> bool {
        ConsumerStats::increment(&self.stats.poll_failures);
        let record = self.failures.record_failure();

        if record.should_log {
            warn!(
                consumer_id = %self.consumer_id,
                queue_url = %self.client.queue_url(),
                error = %err,
                "Failed to poll action queue"
            );
        } else {
            debug!(
                consumer_id = %self.consumer_id,
                consecutive_failures = record.consecutive,
                error = %err,
                "Poll failed again"
            );
        }

        if record.escalate {
            self.request_reregistration(record.consecutive);
        }
        record.escalate
    }

    fn request_reregistration(&self, consecutive: u32) {
        match self.channels.triggers.try_send(Utc::now()) {
            Ok(()) => {
                ConsumerStats::increment(&self.stats.reregistrations_requested);
                warn!(
                    consumer_id = %self.consumer_id,
                    consecutive_failures = consecutive,
                    "Requested re-registration after repeated poll failures"
                );
            }
            Err(TrySendError::Full(_)) => {
                debug!(
                    consumer_id = %self.consumer_id,
                    "Re-registration already pending; signal coalesced"
                );
            }
            Err(TrySendError::Closed(_)) => {
                error!(
                    consumer_id = %self.consumer_id,
                    "Re-registration channel closed; cannot request new credentials"
                );
            }
        }
    }

    /// Apply admission to one message
    async fn admit(&mut self, message: InboundMessage) -> AgentResult<Handled> {
        let disposition =
            admission::evaluate(&message, &self.agent_id, self.authenticator.as_ref());

        match disposition {
            Disposition::MissingAgentId => {
                warn!(
                    consumer_id = %self.consumer_id,
                    message_id = %message.message_id,
                    "Message has no agentID attribute; skipping"
                );
                ConsumerStats::increment(&self.stats.skipped);
                Ok(Handled::Settled)
            }
            Disposition::MissingSignature => {
                warn!(
                    consumer_id = %self.consumer_id,
                    message_id = %message.message_id,
                    "Message has no signature attribute; skipping"
                );
                ConsumerStats::increment(&self.stats.skipped);
                Ok(Handled::Settled)
            }
            Disposition::Foreign { agent_id } => {
                debug!(
                    consumer_id = %self.consumer_id,
                    message_id = %message.message_id,
                    addressed_to = %agent_id,
                    "Releasing message addressed to another agent"
                );
                if self.set_visibility(&message, 0).await {
                    ConsumerStats::increment(&self.stats.released);
                }
                Ok(Handled::Settled)
            }
            Disposition::Rejected(reason) => {
                match &reason {
                    RejectReason::AgentMismatch { .. } | RejectReason::Undecodable(_) => error!(
                        consumer_id = %self.consumer_id,
                        message_id = %message.message_id,
                        agent_id = %self.agent_id,
                        reason = %reason,
                        "Anomalous signed message; deleting"
                    ),
                    _ => warn!(
                        consumer_id = %self.consumer_id,
                        message_id = %message.message_id,
                        reason = %reason,
                        "Message failed authentication; deleting"
                    ),
                }
                self.delete(&message).await;
                Ok(Handled::Settled)
            }
            Disposition::Accepted(event) => self.dispatch(&message, event).await,
        }
    }

    async fn dispatch(&mut self, message: &InboundMessage, event: Event) -> AgentResult<Handled> {
        let visibility =
            admission::extended_visibility(event.timeout, self.config.visibility_buffer_seconds);
        self.set_visibility(message, visibility).await;

        let event = event.with_transport(&message.message_id, &message.receipt_handle);

        debug!(
            consumer_id = %self.consumer_id,
            message_id = %message.message_id,
            event_id = %event.event_id,
            runbook = %event.runbook_name,
            visibility_seconds = visibility,
            "Dispatching event"
        );

        // A full channel blocks here until the pipeline catches up or shutdown arrives
        let sent = tokio::select! {
            result = self.channels.events.send(event) => Some(result.is_ok()),
            () = wait_for_shutdown(&mut self.shutdown) => None,
        };

        match sent {
            Some(true) => {
                ConsumerStats::increment(&self.stats.dispatched);
                Ok(Handled::Dispatched)
            }
            Some(false) => {
                error!(
                    consumer_id = %self.consumer_id,
                    message_id = %message.message_id,
                    "Event dispatch channel closed; releasing message and stopping"
                );
                self.set_visibility(message, 0).await;
                Err(AgentError::ChannelClosed("event dispatch".to_string()))
            }
            None => {
                info!(
                    consumer_id = %self.consumer_id,
                    message_id = %message.message_id,
                    "Shutdown while dispatch was blocked; releasing message"
                );
                if self.set_visibility(message, 0).await {
                    ConsumerStats::increment(&self.stats.released);
                }
                Ok(Handled::Interrupted)
            }
        }
    }

    /// Return undispatched messages to the queue
    async fn release_all(&self, messages: impl Iterator<Item = InboundMessage>) {
        for message in messages {
            if self.set_visibility(&message, 0).await {
                ConsumerStats::increment(&self.stats.released);
            }
        }
    }

    /// Returns false when the call failed (already logged and counted)
    async fn set_visibility(&self, message: &InboundMessage, timeout_seconds: i32) -> bool {
        match self
            .client
            .change_visibility(&message.receipt_handle, timeout_seconds)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    consumer_id = %self.consumer_id,
                    message_id = %message.message_id,
                    timeout_seconds,
                    error = %e,
                    "Failed to change message visibility"
                );
                ConsumerStats::increment(&self.stats.operation_failures);
                false
            }
        }
    }

    async fn delete(&self, message: &InboundMessage) {
        match self.client.delete(&message.receipt_handle).await {
            Ok(()) => ConsumerStats::increment(&self.stats.deleted),
            Err(e) => {
                warn!(
                    consumer_id = %self.consumer_id,
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to delete message"
                );
                ConsumerStats::increment(&self.stats.operation_failures);
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        let requested = *self.shutdown.borrow();
        if requested {
            info!(consumer_id = %self.consumer_id, "Shutdown requested");
        }
        requested
    }

    pub fn consumer_id(&self) -> Uuid {
        self.consumer_id
    }

    /// Agent id the current queue client was built for
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Shared statistics handle; stays valid after the consumer is moved
    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.consecutive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_outcome_pacing() {
        assert!(!CycleOutcome::ClientRebuilt.is_idle());
        assert!(CycleOutcome::Polled {
            received: 3,
            dispatched: 0
        }
        .is_idle());
        assert!(!CycleOutcome::Polled {
            received: 3,
            dispatched: 1
        }
        .is_idle());
        assert!(CycleOutcome::PollFailed { escalated: true }.is_idle());
        assert!(!CycleOutcome::Interrupted {
            received: 2,
            dispatched: 1
        }
        .is_idle());
    }

    #[test]
    fn test_bounded_channels_use_configured_capacity() {
        let config = ConsumerConfig {
            trigger_capacity: 1,
            ..Default::default()
        };
        let (consumer_side, _collaborators) = ConsumerChannels::bounded(&config);

        assert!(consumer_side.triggers.try_send(Utc::now()).is_ok());
        assert!(matches!(
            consumer_side.triggers.try_send(Utc::now()),
            Err(TrySendError::Full(_))
        ));
        assert_eq!(consumer_side.events.max_capacity(), config.dispatch_capacity);
    }
}
