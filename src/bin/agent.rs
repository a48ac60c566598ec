//! # Runbook Agent
//!
//! Registers the host, consumes runbook requests from its action queue and
//! hands them to the runbook sink until Ctrl+C, SIGTERM, or a fatal task error.
//!
//! ## Usage
//!
//! ```bash
//! runbook-agent --config /etc/runbook-agent/agent.json
//! runbook-agent --endpoint api.example.com --api-key <key>
//! ```
//!
//! Runbook execution is not part of this binary; the sink logs each request.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use runbook_agent::{
    init_logging, AgentError, CollaboratorChannels, ConfigLoader, ConsumerChannels,
    Ed25519Authenticator, Event, HostMetadata, HttpRegistrar, LoadOptions, LoggingOptions,
    QueueConsumer, RegistrationRequest, RegistrationService, RetryPolicy, SqsClientFactory,
};

#[derive(Parser, Debug)]
#[command(name = "runbook-agent")]
#[command(about = "Consume signed runbook requests from the agent action queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Registration server endpoint (host[:port])
    #[arg(long)]
    endpoint: Option<String>,

    /// Account API key
    #[arg(long)]
    api_key: Option<String>,

    /// Configuration file (default: agent.json next to the executable)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::load(&LoadOptions {
        config_path: cli.config,
        endpoint: cli.endpoint,
        api_key: cli.api_key,
        ignore_environment: false,
    })
    .context("Failed to load configuration")?;
    let config_file = loader.config_file().map(|p| p.display().to_string());
    let config = loader.into_config();

    let _log_guard = init_logging(&LoggingOptions {
        log_file: Some(config.agent.log_file.clone()),
        debug_mode: config.agent.debug_mode,
    })
    .context("Failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_file = config_file.as_deref().unwrap_or("<none>"),
        endpoint = %config.server.endpoint,
        "Starting runbook agent"
    );

    let start_time_ms = Utc::now().timestamp_millis();
    let metadata = HostMetadata::collect(&config.metadata, &config.agent.assigned_hostname)
        .await
        .context("Failed to collect host metadata")?;

    let authenticator = Arc::new(
        Ed25519Authenticator::from_base64(&config.authenticator.public_key)
            .context("Invalid authenticator public key")?,
    );
    let registrar = Arc::new(
        HttpRegistrar::new(&config.server).context("Failed to create registration client")?,
    );
    let registration = RegistrationService::new(
        registrar,
        RegistrationRequest::from_metadata(&metadata, start_time_ms),
        RetryPolicy::from(&config.registration),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut registration_shutdown = shutdown_rx.clone();
    let identity = tokio::select! {
        result = registration.register_with_retry(&mut registration_shutdown) => {
            result.context("Initial registration failed")?
        }
        _ = shutdown_signal() => {
            info!("Shutdown requested before registration completed");
            return Ok(());
        }
    };
    let identity = identity.into_shared();

    let (channels, collaborators) = ConsumerChannels::bounded(&config.consumer);
    let CollaboratorChannels {
        events,
        triggers,
        updates,
    } = collaborators;

    let mut consumer = QueueConsumer::new(
        config.consumer.clone(),
        Arc::clone(&identity),
        Arc::new(SqsClientFactory),
        authenticator,
        channels,
        shutdown_rx.clone(),
    )
    .context("Failed to create queue consumer")?;
    let stats = consumer.stats();

    // Tasks report failures here instead of exiting the process themselves
    let (error_tx, mut error_rx) = mpsc::channel::<AgentError>(4);

    let consumer_errors = error_tx.clone();
    let consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer.run().await {
            let _ = consumer_errors.send(e).await;
        }
    });

    let registration_errors = error_tx.clone();
    let registration_shutdown = shutdown_rx.clone();
    let registration_task = tokio::spawn(async move {
        if let Err(e) = registration
            .run(identity, triggers, updates, registration_shutdown)
            .await
        {
            let _ = registration_errors.send(e).await;
        }
    });

    let sink_task = tokio::spawn(log_runbook_sink(events));
    drop(error_tx);

    info!("Agent running; press Ctrl+C to shut down");

    let failure = tokio::select! {
        _ = shutdown_signal() => None,
        Some(e) = error_rx.recv() => {
            error!(error = %e, fatal = e.is_fatal(), "Agent task failed");
            Some(e)
        }
    };

    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    for (name, task) in [("consumer", consumer_task), ("registration", registration_task)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "Task did not finish cleanly");
        }
    }
    match sink_task.await {
        Ok(received) => info!(received, "Runbook sink drained"),
        Err(e) => warn!(error = %e, "Runbook sink did not finish cleanly"),
    }

    info!(stats = ?stats.snapshot(), "Runbook agent stopped");

    match failure {
        Some(e) => Err(e).context("Runbook agent stopped on error"),
        None => Ok(()),
    }
}

/// Log-only stand-in for the runbook pipeline
async fn log_runbook_sink(mut events: mpsc::Receiver<Event>) -> u64 {
    let mut received = 0;
    while let Some(event) = events.recv().await {
        received += 1;
        info!(
            event_id = %event.event_id,
            runbook = %event.runbook_name,
            action_type = %event.action_type,
            rule_id = %event.rule_id,
            message_id = %event.message_id,
            timeout_seconds = event.timeout,
            "Received runbook request"
        );
    }
    received
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
