use super::{CycleReport, DaemonConfig, DaemonState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Point-in-time view of the daemon, served on `/status`
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub project_id: String,
    pub state: DaemonState,
    pub dry_run: bool,
    pub interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cycle_at: Option<DateTime<Utc>>,
    pub cycles_run: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<CycleReport>,
}

/// Shared, updatable daemon status
#[derive(Debug, Clone)]
pub struct StatusBoard {
    inner: Arc<RwLock<DaemonStatus>>,
}

impl StatusBoard {
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DaemonStatus {
                project_id: config.project_id.clone(),
                state: DaemonState::Created,
                dry_run: config.dry_run,
                interval_secs: config.interval.as_secs(),
                started_at: None,
                last_cycle_at: None,
                next_cycle_at: None,
                cycles_run: 0,
                last_error: None,
                last_report: None,
            })),
        }
    }

    pub async fn snapshot(&self) -> DaemonStatus {
        self.inner.read().await.clone()
    }

    pub(crate) async fn set_state(&self, state: DaemonState) {
        let mut status = self.inner.write().await;
        if state == DaemonState::Running && status.started_at.is_none() {
            status.started_at = Some(Utc::now());
        }
        status.state = state;
    }

    pub(crate) async fn record_cycle(
        &self,
        outcome: Result<CycleReport, String>,
        finished_at: DateTime<Utc>,
        next_cycle_at: DateTime<Utc>,
    ) {
        let mut status = self.inner.write().await;
        status.cycles_run += 1;
        status.last_cycle_at = Some(finished_at);
        status.next_cycle_at = Some(next_cycle_at);
        match outcome {
            Ok(report) => {
                status.last_error = None;
                status.last_report = Some(report);
            }
            Err(error) => status.last_error = Some(error),
        }
    }
}
