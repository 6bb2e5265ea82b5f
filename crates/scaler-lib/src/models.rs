//! Core data models for the autoscaler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Managed database edition
///
/// The edition decides whether a resize always restarts the instance or
/// can be done with near-zero downtime inside timing windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Edition {
    #[default]
    Enterprise,
    EnterprisePlus,
}

impl Edition {
    /// Parse an edition name. Unknown values fall back to `Enterprise`,
    /// the more restrictive policy.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "ENTERPRISE_PLUS" => Edition::EnterprisePlus,
            _ => Edition::Enterprise,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Edition::Enterprise => "ENTERPRISE",
            Edition::EnterprisePlus => "ENTERPRISE_PLUS",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Edition::Enterprise => "Enterprise",
            Edition::EnterprisePlus => "Enterprise Plus",
        }
    }

    /// Scaling policy for this edition
    pub fn constraints(&self) -> ScalingConstraints {
        match self {
            Edition::EnterprisePlus => ScalingConstraints {
                min_upscale_interval: Duration::from_secs(30 * 60),
                min_downscale_interval: Duration::from_secs(3 * 60 * 60),
                downtime_on_scale: false,
            },
            Edition::Enterprise => ScalingConstraints {
                min_upscale_interval: Duration::ZERO,
                min_downscale_interval: Duration::ZERO,
                downtime_on_scale: true,
            },
        }
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-edition scaling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingConstraints {
    /// Minimum time between two upscale operations to avoid downtime
    pub min_upscale_interval: Duration,
    /// Minimum time between two downscale operations to avoid downtime
    pub min_downscale_interval: Duration,
    /// Whether every resize restarts the instance
    pub downtime_on_scale: bool,
}

/// Snapshot of one managed database instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub name: String,
    pub project: String,
    pub database_version: String,
    /// Current machine tier identifier, e.g. `db-n1-standard-2`
    pub tier: String,
    pub edition: Edition,
    /// Lifecycle state as reported by the control plane, e.g. `RUNNABLE`
    pub state: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub high_availability: bool,
    pub backup_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scaled_at: Option<DateTime<Utc>>,
}

impl InstanceDescriptor {
    /// Copy of this descriptor with the given last-scaled time
    pub fn with_last_scaled(mut self, last_scaled_at: Option<DateTime<Utc>>) -> Self {
        self.last_scaled_at = last_scaled_at;
        self
    }
}

/// Status of a control-plane operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
    #[serde(other)]
    Unknown,
}

impl OperationStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "PENDING" => OperationStatus::Pending,
            "RUNNING" => OperationStatus::Running,
            "DONE" => OperationStatus::Done,
            _ => OperationStatus::Unknown,
        }
    }
}

/// One entry of an instance's operation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    /// Operation kind, e.g. `UPDATE`, `BACKUP_VOLUME`, `RESTART`
    pub operation_type: String,
    pub status: OperationStatus,
    pub insert_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl OperationRecord {
    /// True for an update operation that finished without error
    pub fn is_completed_update(&self) -> bool {
        self.operation_type.eq_ignore_ascii_case("UPDATE")
            && self.status == OperationStatus::Done
            && self.error.is_none()
    }
}

/// Metric samples keyed by timestamp, as returned by a metrics source
pub type MetricPoints = BTreeMap<DateTime<Utc>, f64>;

/// Time-aligned metric series for one instance
///
/// All vectors have the same length and share the index-to-timestamp
/// mapping; timestamps are ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    pub timestamps: Vec<DateTime<Utc>>,
    /// CPU utilization in percent (0-100)
    pub cpu_percent: Vec<f64>,
    /// Memory utilization in percent (0-100)
    pub memory_percent: Vec<f64>,
    /// Memory in use, bytes
    pub memory_bytes: Vec<f64>,
    pub connections: Vec<u64>,
}

impl MetricSeries {
    /// Align independently sampled streams onto the CPU stream's timestamps.
    ///
    /// Utilization streams are fractions (0-1) and are converted to percent.
    /// Samples missing from a secondary stream default to zero.
    pub fn align(
        cpu_utilization: &MetricPoints,
        memory_utilization: &MetricPoints,
        memory_bytes: &MetricPoints,
        connections: &MetricPoints,
    ) -> Self {
        let len = cpu_utilization.len();
        let mut series = MetricSeries {
            timestamps: Vec::with_capacity(len),
            cpu_percent: Vec::with_capacity(len),
            memory_percent: Vec::with_capacity(len),
            memory_bytes: Vec::with_capacity(len),
            connections: Vec::with_capacity(len),
        };

        // BTreeMap iteration is already ascending by timestamp
        for (timestamp, cpu) in cpu_utilization {
            series.timestamps.push(*timestamp);
            series.cpu_percent.push(cpu * 100.0);
            series
                .memory_percent
                .push(memory_utilization.get(timestamp).copied().unwrap_or(0.0) * 100.0);
            series
                .memory_bytes
                .push(memory_bytes.get(timestamp).copied().unwrap_or(0.0));
            series.connections.push(
                connections
                    .get(timestamp)
                    .map(|c| c.max(0.0).round() as u64)
                    .unwrap_or(0),
            );
        }

        series
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Statistical summary of a metric series
///
/// A summary of an empty series has zero data points and every statistic at
/// zero; callers treat fewer than ten data points as insufficient data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub cpu_avg: f64,
    pub cpu_p95: f64,
    pub cpu_p99: f64,
    pub cpu_max: f64,
    pub memory_avg_gb: f64,
    pub memory_p95_gb: f64,
    pub memory_p99_gb: f64,
    pub memory_max_gb: f64,
    pub memory_avg_pct: f64,
    pub memory_p95_pct: f64,
    pub memory_p99_pct: f64,
    pub memory_max_pct: f64,
    pub connections_avg: f64,
    pub connections_max: u64,
    pub data_points: usize,
    /// Time covered by the series, seconds
    pub period_secs: i64,
}

impl MetricsSummary {
    pub fn period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.period_secs)
    }
}

/// Direction of a recommended resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDirection::Up => "up",
            ScaleDirection::Down => "down",
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Downtime impact of performing a resize now
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DowntimeAssessment {
    pub expected: bool,
    pub reason: Option<String>,
    /// Whole minutes until the resize can run without downtime
    pub wait_minutes: Option<i64>,
}

impl DowntimeAssessment {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn always(reason: impl Into<String>) -> Self {
        Self {
            expected: true,
            reason: Some(reason.into()),
            wait_minutes: None,
        }
    }

    pub fn until(reason: impl Into<String>, wait_minutes: i64) -> Self {
        Self {
            expected: true,
            reason: Some(reason.into()),
            wait_minutes: Some(wait_minutes),
        }
    }
}

/// Outcome of analyzing one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub should_scale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<ScaleDirection>,
    pub current_tier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_tier: Option<String>,
    pub reason: String,
    pub downtime_expected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downtime_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downtime_wait_minutes: Option<i64>,
    /// Monthly cost delta in USD; positive means savings
    pub estimated_monthly_savings: f64,
}

impl ScalingDecision {
    /// A decision to leave the instance as it is
    pub fn hold(current_tier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            should_scale: false,
            direction: None,
            current_tier: current_tier.into(),
            recommended_tier: None,
            reason: reason.into(),
            downtime_expected: false,
            downtime_reason: None,
            downtime_wait_minutes: None,
            estimated_monthly_savings: 0.0,
        }
    }

    /// A decision to move the instance to another tier
    pub fn scale(
        current_tier: impl Into<String>,
        recommended_tier: impl Into<String>,
        direction: ScaleDirection,
        reason: impl Into<String>,
        downtime: DowntimeAssessment,
        estimated_monthly_savings: f64,
    ) -> Self {
        Self {
            should_scale: true,
            direction: Some(direction),
            current_tier: current_tier.into(),
            recommended_tier: Some(recommended_tier.into()),
            reason: reason.into(),
            downtime_expected: downtime.expected,
            downtime_reason: downtime.reason,
            downtime_wait_minutes: downtime.wait_minutes,
            estimated_monthly_savings,
        }
    }

    /// Tier the instance would end up on
    pub fn target_tier(&self) -> &str {
        self.recommended_tier
            .as_deref()
            .unwrap_or(self.current_tier.as_str())
    }
}
