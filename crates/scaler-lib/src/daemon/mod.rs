//! Autoscaling daemon
//!
//! Runs one autoscaling cycle immediately and then on every interval tick,
//! alongside an optional HTTP side channel, until a shutdown signal
//! arrives. Cycles never overlap; each runs in its own task so a panic is
//! contained to that cycle.

mod errors;
mod runner;
mod signals;
mod status;

#[cfg(test)]
mod tests;

pub use errors::DaemonError;
pub use runner::{AutoscalingRunner, CycleReport, CycleRunner};
pub use signals::{manual_signal, ManualSignal, ManualTrigger, OsSignals, SignalSource};
pub use status::{DaemonStatus, StatusBoard};

use crate::config::AnalysisConfig;
use crate::health::{components, HealthRegistry};
use crate::observability::{error_types, MetricsReporter, NoopReporter};
use crate::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Time the side channel gets to stop once shutdown starts
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Lifecycle of a daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

/// Auxiliary server run next to the cycle loop
#[async_trait]
pub trait SideChannel: Send + Sync {
    /// Serve until `shutdown` fires.
    async fn serve(&self, shutdown: ShutdownSignal) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub project_id: String,
    /// Time between cycle starts
    pub interval: Duration,
    /// Port of the HTTP side channel; `None` disables it
    pub http_port: Option<u16>,
    pub metrics_enabled: bool,
    pub dry_run: bool,
    pub shutdown_grace: Duration,
}

impl DaemonConfig {
    pub fn new(analysis: &AnalysisConfig, interval: Duration) -> Self {
        Self {
            project_id: analysis.project_id.clone(),
            interval,
            http_port: None,
            metrics_enabled: false,
            dry_run: analysis.dry_run,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.project_id.trim().is_empty() {
            return Err(DaemonError::InvalidConfig("project id is required".to_string()));
        }
        if self.interval.is_zero() {
            return Err(DaemonError::InvalidConfig(
                "interval must be greater than zero".to_string(),
            ));
        }
        if self.http_port == Some(0) {
            return Err(DaemonError::InvalidConfig(
                "HTTP port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct Daemon {
    config: DaemonConfig,
    runner: Arc<dyn CycleRunner>,
    reporter: Arc<dyn MetricsReporter>,
    side_channel: Option<Arc<dyn SideChannel>>,
    signals: Box<dyn SignalSource>,
    health: HealthRegistry,
    status: StatusBoard,
    trigger: ShutdownTrigger,
    state: watch::Sender<DaemonState>,
}

impl Daemon {
    pub fn builder() -> DaemonBuilder {
        DaemonBuilder::new()
    }

    pub fn state(&self) -> DaemonState {
        *self.state.borrow()
    }

    /// Observe state transitions, including after `run` consumes the daemon
    pub fn subscribe_state(&self) -> watch::Receiver<DaemonState> {
        self.state.subscribe()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.trigger.signal()
    }

    pub fn status_board(&self) -> StatusBoard {
        self.status.clone()
    }

    /// Run until a shutdown signal arrives, then stop the cycle loop and
    /// the side channel.
    pub async fn run(self) -> Result<(), DaemonError> {
        let Daemon {
            config,
            runner,
            reporter,
            side_channel,
            mut signals,
            health,
            status,
            trigger,
            state,
        } = self;

        info!(
            project = %config.project_id,
            interval_secs = config.interval.as_secs(),
            dry_run = config.dry_run,
            http_port = ?config.http_port,
            "Starting autoscaler daemon"
        );

        set_state(&state, &status, DaemonState::Running).await;
        health.set_ready(true).await;

        let side_handle = side_channel.map(|server| {
            let signal = trigger.signal();
            let reporter = Arc::clone(&reporter);
            tokio::spawn(async move {
                let result = server.serve(signal).await;
                if let Err(e) = &result {
                    error!(error = %e, "HTTP side channel failed");
                    reporter.record_error(error_types::HTTP_SERVER);
                }
                result
            })
        });

        let cycle_loop = CycleLoop {
            runner,
            reporter,
            health: health.clone(),
            status: status.clone(),
            interval: config.interval,
        };
        let loop_handle = tokio::spawn(cycle_loop.run(trigger.signal()));

        let signal_result = signals.wait_for_shutdown().await;
        match &signal_result {
            Ok(reason) => info!(reason = %reason, "Received shutdown signal"),
            Err(e) => error!(error = %e, "Signal handling failed, shutting down"),
        }

        set_state(&state, &status, DaemonState::ShuttingDown).await;
        health.set_ready(false).await;
        trigger.trigger();

        if let Err(e) = loop_handle.await {
            error!(error = %e, "Cycle loop terminated abnormally");
        }
        if let Some(handle) = side_handle {
            join_side_channel(handle, config.shutdown_grace).await;
        }

        set_state(&state, &status, DaemonState::Stopped).await;
        info!("Autoscaler daemon stopped");

        signal_result.map(|_| ())
    }
}

async fn set_state(state: &watch::Sender<DaemonState>, status: &StatusBoard, next: DaemonState) {
    state.send_replace(next);
    status.set_state(next).await;
}

async fn join_side_channel(mut handle: JoinHandle<anyhow::Result<()>>, grace: Duration) {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(Ok(()))) => info!("HTTP side channel stopped"),
        Ok(Ok(Err(_))) => {}
        Ok(Err(e)) => warn!(error = %e, "HTTP side channel task failed"),
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs(),
                "HTTP side channel did not stop within grace period, aborting"
            );
            handle.abort();
        }
    }
}

/// The sequential cycle executor
struct CycleLoop {
    runner: Arc<dyn CycleRunner>,
    reporter: Arc<dyn MetricsReporter>,
    health: HealthRegistry,
    status: StatusBoard,
    interval: Duration,
}

impl CycleLoop {
    async fn run(self, shutdown: ShutdownSignal) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    info!("Shutting down autoscaling loop");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_once(&shutdown).await;
                }
            }
        }
    }

    async fn run_once(&self, shutdown: &ShutdownSignal) {
        let runner = Arc::clone(&self.runner);
        let signal = shutdown.clone();
        let joined = tokio::spawn(async move { runner.run_cycle(&signal).await }).await;

        let finished_at = Utc::now();
        let next_cycle_at = finished_at
            + chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::zero());

        match joined {
            Ok(Ok(report)) => {
                self.health.record_success(components::ANALYZER).await;
                self.health.record_success(components::SCALER).await;
                self.status
                    .record_cycle(Ok(report), finished_at, next_cycle_at)
                    .await;
            }
            Ok(Err(err)) => {
                if err.is_recoverable() {
                    warn!(error = %err, "Autoscaling cycle failed");
                } else {
                    error!(error = %err, "Autoscaling cycle failed, continuing with next cycle");
                }
                match &err {
                    DaemonError::Apply { .. } => {
                        self.health.record_success(components::ANALYZER).await;
                        self.health
                            .record_failure(components::SCALER, err.to_string())
                            .await;
                    }
                    _ => {
                        self.health
                            .record_failure(components::ANALYZER, err.to_string())
                            .await;
                    }
                }
                self.status
                    .record_cycle(Err(err.to_string()), finished_at, next_cycle_at)
                    .await;
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    self.reporter.record_error(error_types::PANIC);
                    error!("Recovered from panic in autoscaling cycle");
                    "autoscaling cycle panicked".to_string()
                } else {
                    warn!(error = %join_error, "Autoscaling cycle was cancelled");
                    "autoscaling cycle was cancelled".to_string()
                };
                self.health
                    .record_failure(components::ANALYZER, message.clone())
                    .await;
                self.status
                    .record_cycle(Err(message), finished_at, next_cycle_at)
                    .await;
            }
        }
    }
}

/// Builder for the daemon
pub struct DaemonBuilder {
    config: Option<DaemonConfig>,
    runner: Option<Arc<dyn CycleRunner>>,
    reporter: Option<Arc<dyn MetricsReporter>>,
    side_channel: Option<Arc<dyn SideChannel>>,
    signals: Option<Box<dyn SignalSource>>,
    health: Option<HealthRegistry>,
    status: Option<StatusBoard>,
}

impl DaemonBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            runner: None,
            reporter: None,
            side_channel: None,
            signals: None,
            health: None,
            status: None,
        }
    }

    pub fn config(mut self, config: DaemonConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the cycle runner
    pub fn runner(mut self, runner: Arc<dyn CycleRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Set the metrics sink; defaults to a no-op reporter
    pub fn reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn side_channel(mut self, side_channel: Arc<dyn SideChannel>) -> Self {
        self.side_channel = Some(side_channel);
        self
    }

    /// Set the shutdown signal source; defaults to OS signals
    pub fn signals(mut self, signals: impl SignalSource + 'static) -> Self {
        self.signals = Some(Box::new(signals));
        self
    }

    /// Share a health registry, e.g. with the HTTP side channel
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Share a status board, e.g. with the HTTP side channel
    pub fn status(mut self, status: StatusBoard) -> Self {
        self.status = Some(status);
        self
    }

    pub fn build(self) -> Result<Daemon, DaemonError> {
        let config = self
            .config
            .ok_or_else(|| DaemonError::InvalidConfig("config is required".to_string()))?;
        config.validate()?;
        let runner = self
            .runner
            .ok_or_else(|| DaemonError::InvalidConfig("cycle runner is required".to_string()))?;

        let (trigger, _) = shutdown_channel();
        let (state, _) = watch::channel(DaemonState::Created);

        Ok(Daemon {
            status: self.status.unwrap_or_else(|| StatusBoard::new(&config)),
            config,
            runner,
            reporter: self.reporter.unwrap_or_else(|| Arc::new(NoopReporter)),
            side_channel: self.side_channel,
            signals: self.signals.unwrap_or_else(|| Box::new(OsSignals)),
            health: self.health.unwrap_or_default(),
            trigger,
            state,
        })
    }
}

impl Default for DaemonBuilder {
    fn default() -> Self {
        Self::new()
    }
}
