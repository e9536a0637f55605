// ============================================================================
// Health and Metrics Routes
// ============================================================================
//
// Endpoints:
// - GET /health        - RabbitMQ + Redis status (200 healthy, 503 otherwise)
// - GET /health/ready  - same as /health
// - GET /health/live   - same as /health
// - GET /metrics       - Prometheus metrics (served on its own port)
//
// The broker check opens a throwaway connection; it never touches the
// publisher's cached channel.
//
// ============================================================================

use crate::broker::connection::BrokerConnectionManager;
use crate::fraud_worker::store::AuditStore;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub const CONNECTED: &str = "connected";
pub const DISCONNECTED: &str = "disconnected";

#[derive(Clone)]
pub struct HealthState {
    pub broker_url: String,
    pub store: Arc<dyn AuditStore>,
    /// Upper bound for each dependency probe
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: &'static str,
    pub rabbitmq: &'static str,
    pub redis: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.rabbitmq == CONNECTED && self.redis == CONNECTED
    }
}

/// Probe both dependencies concurrently and summarize
pub async fn check_health(state: &HealthState) -> HealthReport {
    let broker = tokio::time::timeout(
        state.probe_timeout,
        BrokerConnectionManager::probe(&state.broker_url),
    );
    let store = tokio::time::timeout(state.probe_timeout, state.store.ping());
    let (broker, store) = tokio::join!(broker, store);

    let mut errors = Vec::new();
    let rabbitmq = match broker {
        Ok(Ok(())) => CONNECTED,
        Ok(Err(e)) => {
            errors.push(format!("rabbitmq: {e}"));
            DISCONNECTED
        }
        Err(_) => {
            errors.push("rabbitmq: probe timed out".to_string());
            DISCONNECTED
        }
    };
    let redis = match store {
        Ok(Ok(())) => CONNECTED,
        Ok(Err(e)) => {
            errors.push(format!("redis: {e}"));
            DISCONNECTED
        }
        Err(_) => {
            errors.push("redis: probe timed out".to_string());
            DISCONNECTED
        }
    };

    let healthy = errors.is_empty();
    HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" },
        rabbitmq,
        redis,
        error: (!healthy).then(|| errors.join("; ")),
    }
}

/// GET /health
pub async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    let report = check_health(&state).await;
    if report.is_healthy() {
        (StatusCode::OK, Json(report))
    } else {
        tracing::warn!(
            rabbitmq = report.rabbitmq,
            redis = report.redis,
            error = report.error.as_deref().unwrap_or_default(),
            "Health check failed"
        );
        (StatusCode::SERVICE_UNAVAILABLE, Json(report))
    }
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    match fraud_metrics::gather_metrics() {
        Ok(metrics_data) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            metrics_data,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                "Internal Server Error".to_string(),
            )
        }
    }
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(health_check))
        .route("/health/live", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
}
