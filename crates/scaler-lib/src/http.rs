//! HTTP API for health checks, daemon status and Prometheus metrics

use crate::daemon::{SideChannel, StatusBoard};
use crate::health::HealthRegistry;
use crate::observability::PrometheusReporter;
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::{error, info};

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub status: StatusBoard,
    /// `None` when metrics are disabled
    pub metrics: Option<PrometheusReporter>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        status: StatusBoard,
        metrics: Option<PrometheusReporter>,
    ) -> Self {
        Self {
            health_registry,
            status,
            metrics,
        }
    }
}

/// Health check response - returns 200 while operational, 503 once unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status.snapshot().await)
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(reporter) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics disabled").into_response();
    };

    match reporter.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(healthz))
        .route("/healthz", get(healthz))
        .route("/ready", get(readyz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// The API server, run by the daemon as its side channel
pub struct StatusServer {
    port: u16,
    state: Arc<AppState>,
}

impl StatusServer {
    pub fn new(port: u16, state: AppState) -> Self {
        Self {
            port,
            state: Arc::new(state),
        }
    }
}

#[async_trait]
impl SideChannel for StatusServer {
    async fn serve(&self, shutdown: ShutdownSignal) -> anyhow::Result<()> {
        let app = create_router(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        info!(addr = %addr, "Starting API server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.triggered().await })
            .await?;

        Ok(())
    }
}
