//! Collaborator interfaces for telemetry and instance control
//!
//! The analyzer only talks to these traits; the REST adapters in
//! [`crate::cloud`] implement them against the managed-database APIs and
//! tests substitute in-memory fakes.

use crate::models::{InstanceDescriptor, MetricPoints, OperationRecord};
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Monitoring metric types read by the analyzer
pub mod metric_names {
    pub const CPU_UTILIZATION: &str = "cloudsql.googleapis.com/database/cpu/utilization";
    pub const MEMORY_UTILIZATION: &str = "cloudsql.googleapis.com/database/memory/utilization";
    pub const MEMORY_USAGE: &str = "cloudsql.googleapis.com/database/memory/usage";
    pub const POSTGRES_CONNECTIONS: &str = "cloudsql.googleapis.com/database/postgresql/num_backends";
    pub const MYSQL_CONNECTIONS: &str = "cloudsql.googleapis.com/database/network/connections";
    pub const SQLSERVER_CONNECTIONS: &str =
        "cloudsql.googleapis.com/database/sqlserver/connections/user_connections";
}

/// Connection-count metric for a database engine version
pub fn connections_metric(database_version: &str) -> &'static str {
    let version = database_version.to_ascii_uppercase();
    if version.starts_with("POSTGRES") {
        metric_names::POSTGRES_CONNECTIONS
    } else if version.starts_with("SQLSERVER") {
        metric_names::SQLSERVER_CONNECTIONS
    } else {
        metric_names::MYSQL_CONNECTIONS
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    #[error("instance {0} not found")]
    NotFound(String),

    #[error("operation {id} failed: {message}")]
    OperationFailed { id: String, message: String },

    #[error("operation {0} abandoned due to shutdown")]
    Cancelled(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

/// Time-series telemetry for instances
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch one metric for `instance` between `start` and `end`, aligned to
    /// `alignment`. Values are returned in the metric's native unit.
    async fn fetch(
        &self,
        instance: &str,
        metric: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        alignment: Duration,
    ) -> Result<MetricPoints, SourceError>;
}

/// Control plane for instances of one project
#[async_trait]
pub trait InstanceController: Send + Sync {
    async fn get(&self, instance: &str) -> Result<InstanceDescriptor, SourceError>;

    async fn list(&self, project: &str) -> Result<Vec<InstanceDescriptor>, SourceError>;

    /// Change the tier of `instance` and wait for the operation to finish.
    /// Stops waiting with [`SourceError::Cancelled`] once `shutdown` fires.
    async fn update_tier(
        &self,
        instance: &str,
        tier: &str,
        shutdown: &ShutdownSignal,
    ) -> Result<(), SourceError>;

    /// Most recent operations first, at most `limit`
    async fn recent_operations(
        &self,
        instance: &str,
        limit: usize,
    ) -> Result<Vec<OperationRecord>, SourceError>;
}
