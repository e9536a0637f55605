// ============================================================================
// Fraud Worker - RabbitMQ fraud screening service
// ============================================================================
//
// Consumes transfer-check requests from the CheckFraud queue, flags amounts
// above the configured threshold and republishes the verdict.
//
// Flow per message:
// 1. Parse and validate the request
// 2. Claim the transfer id in Redis (duplicates are acked and skipped)
// 3. Write the audit record, decide, update the audit record, cache verdict
// 4. Publish to FraudEvents + FraudResult (+ FraudCheckResults if delayed)
// 5. Ack; any failure before that rejects the message without requeue
//
// Side servers:
// - HEALTH_PORT  (default 8000): GET /health, /health/ready, /health/live
// - METRICS_PORT (default 8001): GET /metrics
//
// Lifecycle:
// - Consume cycles are supervised: a failed cycle is logged and restarted
//   after FRAUD_SUPERVISOR_RESTART_SECS
// - SIGTERM/SIGINT finishes the in-flight message, closes broker
//   connections and stops the HTTP servers
//
// ============================================================================

use anyhow::{Context, Result};
use fraud_config::Config;
use fraud_redis::RedisClient;
use fraud_screening_shared::broker::{
    retry_with_backoff, AmqpResultPublisher, BrokerConnectionManager,
};
use fraud_screening_shared::decision::ThresholdPolicy;
use fraud_screening_shared::fraud_worker::{
    run_supervised, FraudCheckConsumer, FraudCheckProcessor, RedisAuditStore, RoutingTable,
};
use fraud_screening_shared::health::{health_router, metrics_router, HealthState};
use fraud_screening_shared::utils::mask_url_credentials;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Fraud Worker Starting ===");
    info!("RabbitMQ: {}", mask_url_credentials(&config.rabbitmq.url));
    info!("Input queue: {}", config.rabbitmq.input_queue);
    info!("Output queues: {:?}", config.rabbitmq.output_queues());
    info!("Fraud threshold: {}", config.policy.threshold);
    if config.rabbitmq.dead_letter_enabled {
        info!("Dead-letter queue: {}", config.rabbitmq.dead_letter_queue);
    }

    info!("Connecting to Redis at: {}", mask_url_credentials(&config.redis_url));
    let redis = retry_with_backoff(&config.retry, "redis_connect", || {
        RedisClient::connect(&config.redis_url)
    })
    .await
    .context("Failed to connect to Redis")?;
    info!("Connected to Redis");

    let store = Arc::new(RedisAuditStore::new(
        redis,
        config.redis_key_prefixes.clone(),
        config.store.clone(),
    ));
    let connections = Arc::new(BrokerConnectionManager::new(
        &config.rabbitmq,
        config.retry.clone(),
    ));
    let processor = Arc::new(FraudCheckProcessor::new(
        store.clone(),
        Arc::new(ThresholdPolicy::from(&config.policy)),
        Arc::new(AmqpResultPublisher::new(connections.clone())),
        RoutingTable::from_config(&config.rabbitmq),
    )
    .with_publish_timeout(config.rabbitmq.publish_timeout()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_state = HealthState {
        broker_url: config.rabbitmq.url.clone(),
        store: store.clone(),
        probe_timeout: HEALTH_PROBE_TIMEOUT,
    };
    let health_server = spawn_http_server(
        "health",
        config.health_bind_address(),
        health_router(health_state),
        shutdown_rx.clone(),
    )
    .await?;
    let metrics_server = spawn_http_server(
        "metrics",
        config.metrics_bind_address(),
        metrics_router(),
        shutdown_rx.clone(),
    )
    .await?;

    // Spawn signal handler
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let consumer = FraudCheckConsumer::new(
        config.rabbitmq.clone(),
        config.retry.clone(),
        processor,
    );
    run_supervised(
        &consumer,
        shutdown_rx,
        Duration::from_secs(config.supervisor_restart_secs),
    )
    .await;

    info!("Closing publisher connection...");
    connections.close().await;

    for server in [health_server, metrics_server] {
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server task panicked");
        }
    }

    info!("Fraud worker stopped gracefully");
    Ok(())
}

/// Bind `address` and serve `app` until the shutdown flag flips
async fn spawn_http_server(
    name: &'static str,
    address: String,
    app: axum::Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {name} server to {address}"))?;
    info!("{} server listening on {}", name, address);

    Ok(tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, server = name, "HTTP server failed");
        }
    }))
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler, using Ctrl-C only");
                tokio::signal::ctrl_c().await.ok();
                info!("SIGINT received, initiating graceful shutdown...");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, initiating graceful shutdown...");
    }
}
