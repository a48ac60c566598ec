//! Registration service tests with a scripted registrar

mod common;

use async_trait::async_trait;
use common::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use runbook_agent::registration::RegistrationInfo;
use runbook_agent::{
    AgentError, IdentityUpdate, Registrar, RegistrationError,
    RegistrationRequest, RegistrationService, RetryPolicy,
};

/// Plays back scripted results, then keeps answering with `fallback`
#[derive(Debug)]
struct ScriptedRegistrar {
    script: Mutex<VecDeque<Result<RegistrationInfo, RegistrationError>>>,
    fallback: Option<RegistrationInfo>,
    calls: AtomicUsize,
}

impl ScriptedRegistrar {
    fn new(
        script: Vec<Result<RegistrationInfo, RegistrationError>>,
        fallback: Option<RegistrationInfo>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registrar for ScriptedRegistrar {
    async fn register(
        &self,
        _request: &RegistrationRequest,
    ) -> Result<RegistrationInfo, RegistrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.script.lock().pop_front() {
            return result;
        }
        self.fallback
            .clone()
            .ok_or_else(|| RegistrationError::UnexpectedStatus {
                status: 503,
                body: "unavailable".to_string(),
            })
    }
}

fn info(agent_id: &str) -> RegistrationInfo {
    RegistrationInfo {
        agent_id: agent_id.to_string(),
        create_time: 1,
        update_time: 2,
        action_queue_endpoint: QUEUE_URL.to_string(),
        aws_access_key: format!("AKIA{agent_id}"),
        aws_secret_access_key: "secret".to_string(),
        aws_security_token: "token".to_string(),
    }
}

fn server_error() -> RegistrationError {
    RegistrationError::UnexpectedStatus {
        status: 500,
        body: "boom".to_string(),
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        step: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

fn service(registrar: Arc<ScriptedRegistrar>) -> RegistrationService {
    RegistrationService::new(registrar, RegistrationRequest::default(), fast_retry())
}

#[tokio::test]
async fn test_register_with_retry_until_success() {
    let registrar = ScriptedRegistrar::new(
        vec![
            Err(server_error()),
            // Incomplete responses are retried too
            Ok(RegistrationInfo::default()),
            Ok(info("123456789")),
        ],
        None,
    );
    let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let identity = timeout(PROMPTLY, service(registrar.clone()).register_with_retry(&mut shutdown_rx))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(identity.agent_id, "123456789");
    assert_eq!(identity.queue_endpoint, QUEUE_URL);
    assert_eq!(identity.credentials.session_token.as_deref(), Some("token"));
    assert_eq!(registrar.calls(), 3);
}

#[tokio::test]
async fn test_shutdown_interrupts_retry_wait() {
    let registrar = ScriptedRegistrar::new(vec![], None);
    let slow_retry = RetryPolicy {
        step: Duration::from_secs(60),
        max_delay: Duration::from_secs(60),
    };
    let service = RegistrationService::new(registrar.clone(), RegistrationRequest::default(), slow_retry);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move { service.register_with_retry(&mut shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    let result = timeout(PROMPTLY, task).await.unwrap().unwrap();
    assert!(matches!(result, Err(AgentError::ShutdownRequested(_))));
    assert_eq!(registrar.calls(), 1);
}

#[tokio::test]
async fn test_reregistration_publishes_after_write() {
    let registrar = ScriptedRegistrar::new(vec![Ok(info("222222222"))], None);
    let identity = identity("111111111").into_shared();
    let (triggers_tx, triggers_rx) = mpsc::channel(5);
    let (updates_tx, mut updates_rx) = mpsc::channel(5);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(service(registrar.clone()).run(
        Arc::clone(&identity),
        triggers_rx,
        updates_tx,
        shutdown_rx,
    ));

    triggers_tx.send(chrono::Utc::now()).await.unwrap();
    let update = timeout(PROMPTLY, updates_rx.recv()).await.unwrap().unwrap();

    // The write lock is already released and holds the new identity
    let current = identity.try_read().expect("identity not locked on notice");
    assert_eq!(current.agent_id, "222222222");
    assert_eq!(update.agent_id, "222222222");
    drop(current);

    shutdown_tx.send(true).unwrap();
    timeout(PROMPTLY, task).await.unwrap().unwrap().unwrap();
    assert_eq!(registrar.calls(), 1);
}

#[tokio::test]
async fn test_queued_triggers_are_coalesced() {
    let registrar = ScriptedRegistrar::new(vec![], Some(info("222222222")));
    let identity = identity("111111111").into_shared();
    let (triggers_tx, triggers_rx) = mpsc::channel(5);
    let (updates_tx, mut updates_rx) = mpsc::channel(5);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    for _ in 0..3 {
        triggers_tx.try_send(chrono::Utc::now()).unwrap();
    }

    let task = tokio::spawn(service(registrar.clone()).run(identity, triggers_rx, updates_tx, shutdown_rx));

    timeout(PROMPTLY, updates_rx.recv()).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(updates_rx.try_recv().is_err());
    assert_eq!(registrar.calls(), 1);

    shutdown_tx.send(true).unwrap();
    timeout(PROMPTLY, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_full_update_channel_still_writes_identity() {
    let registrar = ScriptedRegistrar::new(vec![], Some(info("222222222")));
    let identity = identity("111111111").into_shared();
    let (triggers_tx, triggers_rx) = mpsc::channel(5);
    let (updates_tx, mut updates_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    updates_tx.try_send(IdentityUpdate::new("pending")).unwrap();

    let task = tokio::spawn(service(registrar.clone()).run(
        Arc::clone(&identity),
        triggers_rx,
        updates_tx,
        shutdown_rx,
    ));

    triggers_tx.send(chrono::Utc::now()).await.unwrap();
    timeout(PROMPTLY, async {
        while registrar.calls() == 0 || identity.read().agent_id != "222222222" {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("identity rewritten");

    // The pending notice is enough for the consumer to pick up the new identity
    assert_eq!(updates_rx.recv().await.unwrap().agent_id, "pending");
    assert!(updates_rx.try_recv().is_err());

    shutdown_tx.send(true).unwrap();
    timeout(PROMPTLY, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_run_ends_when_trigger_sender_dropped() {
    let registrar = ScriptedRegistrar::new(vec![], None);
    let (triggers_tx, triggers_rx) = mpsc::channel(5);
    let (updates_tx, _updates_rx) = mpsc::channel(5);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(service(registrar.clone()).run(
        identity(AGENT_ID).into_shared(),
        triggers_rx,
        updates_tx,
        shutdown_rx,
    ));
    drop(triggers_tx);

    timeout(PROMPTLY, task).await.unwrap().unwrap().unwrap();
    assert_eq!(registrar.calls(), 0);
}

/// Sustained poll failures lead to a new identity and a rebuilt queue client
#[tokio::test]
async fn test_escalation_round_trip_with_consumer() {
    let harness = ConsumerHarness::new(fast_config());
    harness.client.fail_next_polls(3);

    let registrar = ScriptedRegistrar::new(vec![Ok(info("222222222"))], None);
    let ConsumerHarness {
        mut consumer,
        client,
        factory,
        identity,
        collaborators,
        shutdown,
    } = harness;
    let shutdown_rx = shutdown.subscribe();

    let registration = tokio::spawn(service(registrar.clone()).run(
        Arc::clone(&identity),
        collaborators.triggers,
        collaborators.updates,
        shutdown_rx,
    ));
    let stats = consumer.stats();
    let consumer_task = tokio::spawn(async move { consumer.run().await });

    timeout(PROMPTLY, async {
        while factory.build_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client rebuilt after re-registration");

    assert_eq!(registrar.calls(), 1);
    assert_eq!(factory.built_for()[1].agent_id, "222222222");
    assert_eq!(identity.read().agent_id, "222222222");

    shutdown.send(true).unwrap();
    timeout(PROMPTLY, consumer_task).await.unwrap().unwrap().unwrap();
    timeout(PROMPTLY, registration).await.unwrap().unwrap().unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.reregistrations_requested, 1);
    assert_eq!(snapshot.client_rebuilds, 1);
    assert!(client.poll_count() >= 3);
}
