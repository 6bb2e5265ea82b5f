//! Instance analysis pipeline
//!
//! Composes the metrics source, instance controller, summarizer and rules
//! engine into per-instance and per-project analyses, and applies approved
//! decisions through the instance controller.

mod project;

#[cfg(test)]
mod tests;

pub use project::{
    priority_score, InstanceFailure, ProjectAnalysisResult, ScalingOperation, ScalingPlan,
};

use crate::config::AnalysisConfig;
use crate::models::{
    InstanceDescriptor, MetricPoints, MetricSeries, MetricsSummary, ScalingDecision,
};
use crate::observability::StructuredLogger;
use crate::rules::{self, RulesEngine, ScalingWindow, Thresholds};
use crate::shutdown::ShutdownSignal;
use crate::source::{self, metric_names, InstanceController, MetricsSource, SourceError};
use crate::summary;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How many recent operations are scanned for the last resize
pub const LAST_SCALED_LOOKUP_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("failed to get instance {instance}: {source}")]
    Instance {
        instance: String,
        #[source]
        source: SourceError,
    },

    #[error("failed to list instances in project {project}: {source}")]
    Listing {
        project: String,
        #[source]
        source: SourceError,
    },

    #[error("failed to fetch {metric} for {instance}: {source}")]
    Metrics {
        instance: String,
        metric: &'static str,
        #[source]
        source: SourceError,
    },

    #[error("failed to scale {instance} to {tier}: {source}")]
    Apply {
        instance: String,
        tier: String,
        #[source]
        source: SourceError,
    },
}

/// Full analysis of one instance
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub instance: InstanceDescriptor,
    pub summary: MetricsSummary,
    pub decision: ScalingDecision,
    pub warnings: Vec<String>,
    /// Suggested time to resize; only present when scaling is recommended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaling_window: Option<ScalingWindow>,
    /// Expected restart time of the resize, zero when no downtime is expected
    pub estimated_downtime_secs: u64,
    pub analyzed_at: DateTime<Utc>,
}

/// What happened when a decision was handed to `apply_scaling`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    DryRun,
    Rejected { reason: String },
}

/// Project-wide analysis and apply, as driven by the daemon
#[async_trait]
pub trait ProjectAnalysis: Send + Sync {
    /// Analyze every instance of the configured project. Stops early,
    /// returning what was analyzed so far, once `shutdown` fires.
    async fn analyze_all(&self, shutdown: &ShutdownSignal) -> Result<ProjectAnalysisResult, AnalyzerError>;

    async fn apply_scaling(
        &self,
        instance: &str,
        decision: &ScalingDecision,
        shutdown: &ShutdownSignal,
    ) -> Result<ApplyOutcome, AnalyzerError>;
}

pub struct Analyzer {
    instances: Arc<dyn InstanceController>,
    metrics: Arc<dyn MetricsSource>,
    engine: RulesEngine,
    config: AnalysisConfig,
    logger: StructuredLogger,
}

impl Analyzer {
    pub fn new(
        instances: Arc<dyn InstanceController>,
        metrics: Arc<dyn MetricsSource>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            instances,
            metrics,
            engine: RulesEngine::new(Thresholds::from(&config)),
            logger: StructuredLogger::new(&config.project_id),
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Fetch an instance by name and analyze it.
    pub async fn analyze_instance(&self, name: &str) -> Result<AnalysisResult, AnalyzerError> {
        let descriptor = self
            .instances
            .get(name)
            .await
            .map_err(|source| AnalyzerError::Instance {
                instance: name.to_string(),
                source,
            })?;
        self.analyze_descriptor(descriptor).await
    }

    /// Analyze an instance whose descriptor is already known.
    pub async fn analyze_descriptor(
        &self,
        descriptor: InstanceDescriptor,
    ) -> Result<AnalysisResult, AnalyzerError> {
        let last_scaled = self
            .last_scaled_time(&descriptor.name)
            .await
            .or(descriptor.last_scaled_at);
        let instance = descriptor.with_last_scaled(last_scaled);

        let now = Utc::now();
        let series = self.collect_series(&instance, now).await?;
        let summary = summary::summarize(&series);

        let decision = self.engine.analyze_at(&instance, &summary, now);
        let warnings = rules::advisory_warnings(&instance, &summary, &self.config, now);

        let scaling_window = decision.should_scale.then(|| {
            rules::optimal_scaling_window(&series, &instance.edition.constraints(), now)
        });
        let estimated_downtime_secs = if decision.should_scale && decision.downtime_expected {
            rules::estimate_downtime(&decision.current_tier, decision.target_tier()).as_secs()
        } else {
            0
        };

        self.logger.log_decision(&instance, &summary, &decision);

        Ok(AnalysisResult {
            instance,
            summary,
            decision,
            warnings,
            scaling_window,
            estimated_downtime_secs,
            analyzed_at: now,
        })
    }

    /// Best-effort time of the last completed resize.
    ///
    /// Failures to read the operation history are logged and treated as
    /// "never scaled".
    pub async fn last_scaled_time(&self, instance: &str) -> Option<DateTime<Utc>> {
        match self
            .instances
            .recent_operations(instance, LAST_SCALED_LOOKUP_LIMIT)
            .await
        {
            Ok(operations) => operations
                .iter()
                .filter(|op| op.is_completed_update())
                .filter_map(|op| op.end_time.or(op.insert_time))
                .max(),
            Err(e) => {
                debug!(instance = %instance, error = %e, "Could not read operation history");
                None
            }
        }
    }

    async fn collect_series(
        &self,
        instance: &InstanceDescriptor,
        now: DateTime<Utc>,
    ) -> Result<MetricSeries, AnalyzerError> {
        let lookback = chrono::Duration::from_std(self.config.lookback)
            .unwrap_or_else(|_| chrono::Duration::days(7));
        let start = now - lookback;

        let cpu = self
            .fetch_required(&instance.name, metric_names::CPU_UTILIZATION, start, now)
            .await?;
        let memory = self
            .fetch_required(&instance.name, metric_names::MEMORY_UTILIZATION, start, now)
            .await?;
        let memory_bytes = self
            .fetch_optional(&instance.name, metric_names::MEMORY_USAGE, start, now)
            .await;
        let connections = self
            .fetch_optional(
                &instance.name,
                source::connections_metric(&instance.database_version),
                start,
                now,
            )
            .await;

        debug!(
            instance = %instance.name,
            cpu_points = cpu.len(),
            memory_points = memory.len(),
            "Fetched metrics"
        );

        Ok(MetricSeries::align(&cpu, &memory, &memory_bytes, &connections))
    }

    async fn fetch_required(
        &self,
        instance: &str,
        metric: &'static str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MetricPoints, AnalyzerError> {
        self.metrics
            .fetch(instance, metric, start, end, self.config.granularity)
            .await
            .map_err(|source| AnalyzerError::Metrics {
                instance: instance.to_string(),
                metric,
                source,
            })
    }

    async fn fetch_optional(
        &self,
        instance: &str,
        metric: &'static str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MetricPoints {
        match self
            .metrics
            .fetch(instance, metric, start, end, self.config.granularity)
            .await
        {
            Ok(points) => points,
            Err(e) => {
                warn!(instance = %instance, metric = %metric, error = %e, "Optional metric unavailable");
                MetricPoints::new()
            }
        }
    }

    /// Analyze every instance in the configured project.
    ///
    /// Per-instance failures are logged and recorded in the result rather
    /// than failing the whole run.
    pub async fn analyze_all(
        &self,
        shutdown: &ShutdownSignal,
    ) -> Result<ProjectAnalysisResult, AnalyzerError> {
        let project = &self.config.project_id;
        let listed = self
            .instances
            .list(project)
            .await
            .map_err(|source| AnalyzerError::Listing {
                project: project.clone(),
                source,
            })?;

        let total = listed.len();
        info!(project = %project, instances = total, "Analyzing project instances");

        let mut results = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for descriptor in listed {
            if shutdown.is_triggered() {
                warn!(
                    analyzed = results.len(),
                    remaining = total - results.len() - failures.len(),
                    "Shutdown requested, stopping project analysis early"
                );
                break;
            }

            let name = descriptor.name.clone();
            match self.analyze_descriptor(descriptor).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(instance = %name, error = %e, "Failed to analyze instance");
                    failures.push(InstanceFailure {
                        instance: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(ProjectAnalysisResult::new(project.clone(), total, results, failures))
    }

    /// Apply one decision.
    ///
    /// Decisions that recommend nothing or fail validation come back as
    /// [`ApplyOutcome::Rejected`]; only a failed tier change is an error.
    pub async fn apply_scaling(
        &self,
        instance: &str,
        decision: &ScalingDecision,
        shutdown: &ShutdownSignal,
    ) -> Result<ApplyOutcome, AnalyzerError> {
        if let Err(e) = RulesEngine::validate(decision, self.config.force) {
            info!(instance = %instance, reason = %e, "Scaling not applied");
            return Ok(ApplyOutcome::Rejected {
                reason: e.to_string(),
            });
        }

        let target = decision.target_tier();
        info!(
            instance = %instance,
            from_tier = %decision.current_tier,
            to_tier = %target,
            dry_run = self.config.dry_run,
            "Scaling instance"
        );

        if self.config.dry_run {
            self.logger
                .log_scaling_applied(instance, &decision.current_tier, target, true);
            return Ok(ApplyOutcome::DryRun);
        }

        if let Err(source) = self.instances.update_tier(instance, target, shutdown).await {
            self.logger
                .log_scaling_failed(instance, target, &source.to_string());
            return Err(AnalyzerError::Apply {
                instance: instance.to_string(),
                tier: target.to_string(),
                source,
            });
        }

        self.logger
            .log_scaling_applied(instance, &decision.current_tier, target, false);
        Ok(ApplyOutcome::Applied)
    }
}

#[async_trait]
impl ProjectAnalysis for Analyzer {
    async fn analyze_all(&self, shutdown: &ShutdownSignal) -> Result<ProjectAnalysisResult, AnalyzerError> {
        Analyzer::analyze_all(self, shutdown).await
    }

    async fn apply_scaling(
        &self,
        instance: &str,
        decision: &ScalingDecision,
        shutdown: &ShutdownSignal,
    ) -> Result<ApplyOutcome, AnalyzerError> {
        Analyzer::apply_scaling(self, instance, decision, shutdown).await
    }
}
