//! One autoscaling cycle: analyze the project, then apply what is scalable

use super::DaemonError;
use crate::analyzer::{AnalysisResult, ApplyOutcome, ProjectAnalysis};
use crate::observability::{error_types, MetricsReporter, StructuredLogger};
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Counts from one finished cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub total_instances: usize,
    pub analyzed_instances: usize,
    pub failed_instances: usize,
    pub scalable_instances: usize,
    pub applied: usize,
    /// Rejected by validation or skipped in dry-run mode
    pub skipped: usize,
    pub apply_failures: usize,
    pub dry_run: bool,
}

#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self, shutdown: &ShutdownSignal) -> Result<CycleReport, DaemonError>;
}

/// Records cycle duration and completion when dropped, so both are
/// reported even if the cycle unwinds.
struct CycleGuard {
    reporter: Arc<dyn MetricsReporter>,
    started: Instant,
}

impl CycleGuard {
    fn start(reporter: Arc<dyn MetricsReporter>) -> Self {
        Self {
            reporter,
            started: Instant::now(),
        }
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.reporter.record_cycle_duration(self.started.elapsed());
        self.reporter.record_cycle_completion();
    }
}

/// Cycle runner backed by a project analysis
pub struct AutoscalingRunner {
    analysis: Arc<dyn ProjectAnalysis>,
    reporter: Arc<dyn MetricsReporter>,
    logger: StructuredLogger,
    project_id: String,
    dry_run: bool,
}

impl AutoscalingRunner {
    pub fn new(
        analysis: Arc<dyn ProjectAnalysis>,
        reporter: Arc<dyn MetricsReporter>,
        project_id: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        let project_id = project_id.into();
        Self {
            analysis,
            reporter,
            logger: StructuredLogger::new(&project_id),
            project_id,
            dry_run,
        }
    }

    async fn apply_all(
        &self,
        scalable: &[&AnalysisResult],
        shutdown: &ShutdownSignal,
        report: &mut CycleReport,
    ) -> Result<(), DaemonError> {
        let mut last_error = None;

        for result in scalable {
            if shutdown.is_triggered() {
                warn!("Shutdown requested, skipping remaining scaling operations");
                break;
            }

            let name = result.instance.name.as_str();
            match self
                .analysis
                .apply_scaling(name, &result.decision, shutdown)
                .await
            {
                Ok(ApplyOutcome::Applied) => {
                    report.applied += 1;
                    self.reporter.record_scaling_operation(name, "success");
                }
                Ok(ApplyOutcome::DryRun) => {
                    report.skipped += 1;
                    self.reporter.record_scaling_operation(name, "dry_run");
                }
                Ok(ApplyOutcome::Rejected { reason }) => {
                    report.skipped += 1;
                    self.reporter.record_scaling_operation(name, "rejected");
                    info!(instance = %name, reason = %reason, "Scaling skipped");
                }
                Err(e) => {
                    report.apply_failures += 1;
                    self.reporter.record_error(error_types::SCALING_FAILED);
                    self.reporter.record_scaling_operation(name, "failure");
                    warn!(instance = %name, error = %e, "Failed to scale instance");
                    last_error = Some(e);
                }
            }
        }

        info!(
            applied = report.applied,
            attempted = scalable.len(),
            "Applied scaling operations"
        );

        match last_error {
            Some(source) => Err(DaemonError::Apply {
                op: "apply_scaling",
                failed: report.apply_failures,
                attempted: scalable.len(),
                source,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CycleRunner for AutoscalingRunner {
    async fn run_cycle(&self, shutdown: &ShutdownSignal) -> Result<CycleReport, DaemonError> {
        let guard = CycleGuard::start(Arc::clone(&self.reporter));
        info!(project = %self.project_id, "Starting autoscaling cycle");

        let results = match self.analysis.analyze_all(shutdown).await {
            Ok(results) => results,
            Err(e) => {
                self.reporter.record_error(error_types::ANALYSIS);
                return Err(DaemonError::analyzer("analyze_instances", e));
            }
        };

        let scalable = results.scalable();
        self.reporter.record_instance_counts(
            results.total_instances,
            results.analyzed_instances,
            scalable.len(),
        );
        for result in &results.results {
            self.reporter.record_instance_utilization(
                &self.project_id,
                &result.instance.name,
                result.summary.cpu_p95,
                result.summary.memory_p95_pct,
            );
        }

        info!(
            scalable = scalable.len(),
            analyzed = results.analyzed_instances,
            total = results.total_instances,
            "Found instances needing scaling"
        );

        let mut report = CycleReport {
            total_instances: results.total_instances,
            analyzed_instances: results.analyzed_instances,
            failed_instances: results.failures.len(),
            scalable_instances: scalable.len(),
            dry_run: self.dry_run,
            ..Default::default()
        };

        let applied = if self.dry_run {
            info!(
                would_scale = scalable.len(),
                "Dry-run mode, not applying scaling operations"
            );
            report.skipped = scalable.len();
            Ok(())
        } else {
            self.apply_all(&scalable, shutdown, &mut report).await
        };

        self.logger.log_cycle(
            guard.started.elapsed(),
            report.analyzed_instances,
            report.scalable_instances,
            report.applied,
            report.apply_failures,
        );
        applied.map(|()| report)
    }
}
