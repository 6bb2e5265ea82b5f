//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - The `MetricsReporter` sink the daemon records cycle outcomes into
//! - A Prometheus implementation owning its own registry
//! - Structured JSON logging of scaling events with tracing

use crate::models::{InstanceDescriptor, MetricsSummary, ScalingDecision};
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use tracing::{info, warn};

/// Error type labels recorded by the daemon
pub mod error_types {
    pub const ANALYSIS: &str = "analysis_error";
    pub const SCALING_FAILED: &str = "scaling_failed";
    pub const PANIC: &str = "panic";
    pub const HTTP_SERVER: &str = "http_server";
}

/// Sink for daemon cycle metrics
pub trait MetricsReporter: Send + Sync {
    fn record_cycle_duration(&self, duration: Duration);
    fn record_cycle_completion(&self);
    fn record_error(&self, error_type: &str);
    fn record_instance_counts(&self, total: usize, analyzed: usize, scalable: usize);
    fn record_scaling_operation(&self, instance: &str, result: &str);
    /// P95 utilization in percent
    fn record_instance_utilization(&self, project: &str, instance: &str, cpu_p95: f64, memory_p95: f64);
}

/// Reporter that discards everything, used when metrics are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl MetricsReporter for NoopReporter {
    fn record_cycle_duration(&self, _duration: Duration) {}
    fn record_cycle_completion(&self) {}
    fn record_error(&self, _error_type: &str) {}
    fn record_instance_counts(&self, _total: usize, _analyzed: usize, _scalable: usize) {}
    fn record_scaling_operation(&self, _instance: &str, _result: &str) {}
    fn record_instance_utilization(&self, _project: &str, _instance: &str, _cpu_p95: f64, _memory_p95: f64) {}
}

/// Prometheus metrics for the autoscaler
///
/// Clones share the same registry and collectors.
#[derive(Clone)]
pub struct PrometheusReporter {
    registry: Registry,
    cycle_duration_seconds: Gauge,
    cycles_total: IntCounter,
    errors_total: IntCounterVec,
    instances_total: IntGauge,
    instances_analyzed: IntGauge,
    instances_scalable: IntGauge,
    scaling_operations_total: IntCounterVec,
    instance_cpu_utilization: GaugeVec,
    instance_memory_utilization: GaugeVec,
}

fn register<C>(registry: &Registry, collector: C) -> prometheus::Result<C>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

impl PrometheusReporter {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            cycle_duration_seconds: register(
                &registry,
                Gauge::new(
                    "sqlscaler_cycle_duration_seconds",
                    "Duration of the last autoscaling cycle in seconds",
                )?,
            )?,
            cycles_total: register(
                &registry,
                IntCounter::new(
                    "sqlscaler_cycles_total",
                    "Total number of autoscaling cycles completed",
                )?,
            )?,
            errors_total: register(
                &registry,
                IntCounterVec::new(
                    Opts::new("sqlscaler_errors_total", "Total number of autoscaling errors by type"),
                    &["error_type"],
                )?,
            )?,
            instances_total: register(
                &registry,
                IntGauge::new(
                    "sqlscaler_instances_total",
                    "Total number of database instances in the project",
                )?,
            )?,
            instances_analyzed: register(
                &registry,
                IntGauge::new(
                    "sqlscaler_instances_analyzed",
                    "Number of instances successfully analyzed",
                )?,
            )?,
            instances_scalable: register(
                &registry,
                IntGauge::new("sqlscaler_instances_scalable", "Number of instances that need scaling")?,
            )?,
            scaling_operations_total: register(
                &registry,
                IntCounterVec::new(
                    Opts::new(
                        "sqlscaler_scaling_operations_total",
                        "Total number of scaling operations by instance and result",
                    ),
                    &["instance", "result"],
                )?,
            )?,
            instance_cpu_utilization: register(
                &registry,
                GaugeVec::new(
                    Opts::new(
                        "sqlscaler_instance_cpu_utilization",
                        "P95 CPU utilization of database instances in percent",
                    ),
                    &["project", "instance"],
                )?,
            )?,
            instance_memory_utilization: register(
                &registry,
                GaugeVec::new(
                    Opts::new(
                        "sqlscaler_instance_memory_utilization",
                        "P95 memory utilization of database instances in percent",
                    ),
                    &["project", "instance"],
                )?,
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsReporter for PrometheusReporter {
    fn record_cycle_duration(&self, duration: Duration) {
        self.cycle_duration_seconds.set(duration.as_secs_f64());
    }

    fn record_cycle_completion(&self) {
        self.cycles_total.inc();
    }

    fn record_error(&self, error_type: &str) {
        self.errors_total.with_label_values(&[error_type]).inc();
    }

    fn record_instance_counts(&self, total: usize, analyzed: usize, scalable: usize) {
        self.instances_total.set(total as i64);
        self.instances_analyzed.set(analyzed as i64);
        self.instances_scalable.set(scalable as i64);
    }

    fn record_scaling_operation(&self, instance: &str, result: &str) {
        self.scaling_operations_total
            .with_label_values(&[instance, result])
            .inc();
    }

    fn record_instance_utilization(&self, project: &str, instance: &str, cpu_p95: f64, memory_p95: f64) {
        self.instance_cpu_utilization
            .with_label_values(&[project, instance])
            .set(cpu_p95);
        self.instance_memory_utilization
            .with_label_values(&[project, instance])
            .set(memory_p95);
    }
}

/// Structured logger for autoscaler events
///
/// Emits event-typed records so scaling history can be reconstructed from
/// the JSON log stream.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    project_id: String,
}

impl StructuredLogger {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    /// Log daemon startup
    pub fn log_startup(&self, version: &str, interval: Duration, dry_run: bool) {
        info!(
            event = "daemon_started",
            project = %self.project_id,
            version = %version,
            interval_secs = interval.as_secs(),
            dry_run = dry_run,
            "Autoscaler daemon started"
        );
    }

    /// Log daemon shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "daemon_shutdown",
            project = %self.project_id,
            reason = %reason,
            "Autoscaler daemon shutting down"
        );
    }

    /// Log the outcome of analyzing one instance
    pub fn log_decision(
        &self,
        instance: &InstanceDescriptor,
        summary: &MetricsSummary,
        decision: &ScalingDecision,
    ) {
        info!(
            event = "scaling_decision",
            project = %self.project_id,
            instance = %instance.name,
            edition = %instance.edition,
            current_tier = %decision.current_tier,
            recommended_tier = ?decision.recommended_tier,
            should_scale = decision.should_scale,
            downtime_expected = decision.downtime_expected,
            cpu_p95 = summary.cpu_p95,
            memory_p95_pct = summary.memory_p95_pct,
            data_points = summary.data_points,
            estimated_monthly_savings = decision.estimated_monthly_savings,
            reason = %decision.reason,
            "Analyzed instance"
        );
    }

    /// Log a tier change that completed, or would have in dry-run mode
    pub fn log_scaling_applied(&self, instance: &str, from_tier: &str, to_tier: &str, dry_run: bool) {
        info!(
            event = "scaling_applied",
            project = %self.project_id,
            instance = %instance,
            from_tier = %from_tier,
            to_tier = %to_tier,
            dry_run = dry_run,
            "Scaling operation completed"
        );
    }

    /// Log a tier change that failed
    pub fn log_scaling_failed(&self, instance: &str, to_tier: &str, error: &str) {
        warn!(
            event = "scaling_failed",
            project = %self.project_id,
            instance = %instance,
            to_tier = %to_tier,
            error = %error,
            "Scaling operation failed"
        );
    }

    /// Log the end of one daemon cycle
    pub fn log_cycle(&self, duration: Duration, analyzed: usize, scalable: usize, applied: usize, failed: usize) {
        info!(
            event = "cycle_completed",
            project = %self.project_id,
            duration_ms = duration.as_millis() as u64,
            analyzed = analyzed,
            scalable = scalable,
            applied = applied,
            failed = failed,
            "Autoscaling cycle completed"
        );
    }
}
