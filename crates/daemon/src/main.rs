//! sqlscalerd - managed-database autoscaling daemon
//!
//! Periodically analyzes every instance in a project and resizes the ones
//! whose utilization calls for it, serving health, status and metrics over
//! HTTP while it runs.

use anyhow::{Context, Result};
use scaler_lib::{
    analyzer::{Analyzer, ProjectAnalysis},
    cloud::{http_client, MonitoringClient, RestClient, SqlAdminClient, TokenSource},
    daemon::{AutoscalingRunner, Daemon, OsSignals, StatusBoard},
    health::{components, HealthRegistry},
    http::{AppState, StatusServer},
    observability::{MetricsReporter, NoopReporter, PrometheusReporter, StructuredLogger},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    // Load configuration
    let settings = config::DaemonSettings::load()?;
    let analysis_config = settings.analysis_config()?;
    let daemon_config = settings.daemon_config(&analysis_config);
    info!(
        project = %analysis_config.project_id,
        profile = %settings.profile,
        "Daemon configured"
    );

    // Cloud adapters
    let http = http_client(settings.request_timeout()).context("Failed to create HTTP client")?;
    let tokens = TokenSource::from_settings(settings.access_token.clone(), http.clone());
    let sqladmin = SqlAdminClient::new(
        RestClient::new(http.clone(), &settings.sqladmin_url, tokens.clone())?,
        &analysis_config.project_id,
    );
    let monitoring = MonitoringClient::new(
        RestClient::new(http, &settings.monitoring_url, tokens)?,
        &analysis_config.project_id,
    );

    let analyzer: Arc<dyn ProjectAnalysis> = Arc::new(Analyzer::new(
        Arc::new(sqladmin),
        Arc::new(monitoring),
        analysis_config.clone(),
    ));

    // Initialize metrics
    let prometheus = if daemon_config.metrics_enabled {
        Some(PrometheusReporter::new().context("Failed to register metrics")?)
    } else {
        None
    };
    let reporter: Arc<dyn MetricsReporter> = match &prometheus {
        Some(reporter) => Arc::new(reporter.clone()),
        None => Arc::new(NoopReporter),
    };

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ANALYZER).await;
    health_registry.register(components::SCALER).await;

    let status = StatusBoard::new(&daemon_config);

    // Initialize structured logger
    let logger = StructuredLogger::new(&analysis_config.project_id);
    logger.log_startup(DAEMON_VERSION, daemon_config.interval, daemon_config.dry_run);

    let runner = Arc::new(AutoscalingRunner::new(
        analyzer,
        Arc::clone(&reporter),
        &analysis_config.project_id,
        analysis_config.dry_run,
    ));

    let mut builder = Daemon::builder()
        .config(daemon_config.clone())
        .runner(runner)
        .reporter(reporter)
        .signals(OsSignals)
        .health(health_registry.clone())
        .status(status.clone());

    if let Some(port) = daemon_config.http_port {
        let state = AppState::new(health_registry, status, prometheus);
        builder = builder.side_channel(Arc::new(StatusServer::new(port, state)));
    }

    let daemon = builder.build()?;
    let result = daemon.run().await;

    let reason = match &result {
        Ok(()) => "signal received".to_string(),
        Err(e) => e.to_string(),
    };
    logger.log_shutdown(&reason);
    info!("Shutting down");

    Ok(result?)
}
