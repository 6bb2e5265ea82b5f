use super::*;
use crate::analyzer::{AnalysisResult, AnalyzerError, ApplyOutcome, ProjectAnalysis, ProjectAnalysisResult};
use crate::health::ComponentStatus;
use crate::models::{
    DowntimeAssessment, Edition, InstanceDescriptor, MetricsSummary, ScaleDirection,
    ScalingDecision,
};
use crate::observability::PrometheusReporter;
use crate::source::SourceError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn config(interval: Duration) -> DaemonConfig {
    DaemonConfig::new(&AnalysisConfig::default().with_project("acme"), interval)
}

fn listing_error() -> AnalyzerError {
    AnalyzerError::Listing {
        project: "acme".to_string(),
        source: SourceError::Backend {
            status: 503,
            body: "unavailable".to_string(),
        },
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    FailAnalysis,
    FailApply,
    Panic,
}

struct MockRunner {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockRunner {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CycleRunner for MockRunner {
    async fn run_cycle(&self, _shutdown: &ShutdownSignal) -> Result<CycleReport, DaemonError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => Ok(CycleReport {
                total_instances: 2,
                analyzed_instances: 2,
                ..Default::default()
            }),
            Behavior::FailAnalysis => Err(DaemonError::analyzer("analyze_instances", listing_error())),
            Behavior::FailApply => Err(DaemonError::Apply {
                op: "apply_scaling",
                failed: 1,
                attempted: 1,
                source: listing_error(),
            }),
            Behavior::Panic => panic!("cycle blew up"),
        }
    }
}

async fn wait_for_calls(runner: &MockRunner, calls: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while runner.calls() < calls {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("runner was not called in time");
}

#[tokio::test]
async fn test_builder_requires_runner() {
    let result = Daemon::builder().config(config(Duration::from_secs(60))).build();
    assert!(matches!(result, Err(DaemonError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_builder_requires_config() {
    let result = Daemon::builder()
        .runner(MockRunner::new(Behavior::Succeed))
        .build();
    assert!(matches!(result, Err(DaemonError::InvalidConfig(_))));
}

#[test]
fn test_config_validation() {
    assert!(config(Duration::from_secs(300)).validate().is_ok());
    assert!(config(Duration::ZERO).validate().is_err());
    assert!(config(Duration::from_secs(300)).with_http_port(0).validate().is_err());
    assert!(config(Duration::from_secs(300)).with_http_port(8080).validate().is_ok());

    let mut no_project = config(Duration::from_secs(300));
    no_project.project_id = "  ".to_string();
    assert!(no_project.validate().is_err());
}

#[tokio::test]
async fn test_run_executes_first_cycle_immediately_and_stops_on_signal() {
    let runner = MockRunner::new(Behavior::Succeed);
    let (signal, trigger) = manual_signal();
    let daemon = Daemon::builder()
        .config(config(Duration::from_secs(3600)))
        .runner(runner.clone())
        .signals(signal)
        .build()
        .unwrap();

    assert_eq!(daemon.state(), DaemonState::Created);
    let mut states = daemon.subscribe_state();
    let status = daemon.status_board();
    let shutdown = daemon.shutdown_signal();

    let handle = tokio::spawn(daemon.run());
    wait_for_calls(&runner, 1).await;
    assert_eq!(status.snapshot().await.state, DaemonState::Running);

    trigger.fire();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(*states.borrow_and_update(), DaemonState::Stopped);
    assert!(shutdown.is_triggered());
    assert_eq!(runner.calls(), 1);

    let snapshot = status.snapshot().await;
    assert_eq!(snapshot.state, DaemonState::Stopped);
    assert_eq!(snapshot.cycles_run, 1);
    assert!(snapshot.started_at.is_some());
    assert!(snapshot.last_error.is_none());
    assert_eq!(snapshot.last_report.unwrap().analyzed_instances, 2);
}

#[tokio::test]
async fn test_loop_survives_panicking_cycle() {
    let runner = MockRunner::new(Behavior::Panic);
    let reporter = Arc::new(PrometheusReporter::new().unwrap());
    let (signal, trigger) = manual_signal();
    let daemon = Daemon::builder()
        .config(config(Duration::from_millis(10)))
        .runner(runner.clone())
        .reporter(reporter.clone())
        .signals(signal)
        .build()
        .unwrap();
    let status = daemon.status_board();

    let handle = tokio::spawn(daemon.run());
    wait_for_calls(&runner, 2).await;
    trigger.fire();
    handle.await.unwrap().unwrap();

    let snapshot = status.snapshot().await;
    assert!(snapshot.cycles_run >= 2);
    assert_eq!(snapshot.last_error.as_deref(), Some("autoscaling cycle panicked"));

    let text = reporter.encode().unwrap();
    assert!(text.contains("error_type=\"panic\""));
}

#[tokio::test]
async fn test_repeated_analysis_failures_make_analyzer_unhealthy() {
    let runner = MockRunner::new(Behavior::FailAnalysis);
    let health = HealthRegistry::new();
    health.register(components::ANALYZER).await;
    health.register(components::SCALER).await;
    let (signal, trigger) = manual_signal();
    let daemon = Daemon::builder()
        .config(config(Duration::from_millis(10)))
        .runner(runner.clone())
        .health(health.clone())
        .signals(signal)
        .build()
        .unwrap();

    let handle = tokio::spawn(daemon.run());
    wait_for_calls(&runner, 3).await;
    trigger.fire();
    handle.await.unwrap().unwrap();

    let report = health.health().await;
    let analyzer = &report.components[components::ANALYZER];
    assert_eq!(analyzer.status, ComponentStatus::Unhealthy);
    assert_eq!(analyzer.consecutive_failures as usize, runner.calls());
    assert_eq!(report.components[components::SCALER].status, ComponentStatus::Healthy);

    let readiness = health.readiness().await;
    assert!(!readiness.ready);
}

#[tokio::test]
async fn test_apply_failure_degrades_scaler_only() {
    let runner = MockRunner::new(Behavior::FailApply);
    let health = HealthRegistry::new();
    let (signal, trigger) = manual_signal();
    let daemon = Daemon::builder()
        .config(config(Duration::from_secs(3600)))
        .runner(runner.clone())
        .health(health.clone())
        .signals(signal)
        .build()
        .unwrap();

    let handle = tokio::spawn(daemon.run());
    wait_for_calls(&runner, 1).await;
    trigger.fire();
    handle.await.unwrap().unwrap();

    let report = health.health().await;
    assert_eq!(report.components[components::ANALYZER].status, ComponentStatus::Healthy);
    assert_eq!(report.components[components::SCALER].status, ComponentStatus::Degraded);
}

struct SlowSideChannel {
    served: AtomicUsize,
}

#[async_trait]
impl SideChannel for SlowSideChannel {
    async fn serve(&self, _shutdown: ShutdownSignal) -> anyhow::Result<()> {
        self.served.fetch_add(1, Ordering::SeqCst);
        // Ignores shutdown entirely
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_unresponsive_side_channel_is_aborted_after_grace() {
    let runner = MockRunner::new(Behavior::Succeed);
    let side = Arc::new(SlowSideChannel {
        served: AtomicUsize::new(0),
    });
    let (signal, trigger) = manual_signal();
    let mut cfg = config(Duration::from_secs(3600));
    cfg.shutdown_grace = Duration::from_millis(50);
    let daemon = Daemon::builder()
        .config(cfg)
        .runner(runner.clone())
        .side_channel(side.clone())
        .signals(signal)
        .build()
        .unwrap();

    let handle = tokio::spawn(daemon.run());
    wait_for_calls(&runner, 1).await;
    trigger.fire();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("daemon did not stop after grace period")
        .unwrap()
        .unwrap();
    assert_eq!(side.served.load(Ordering::SeqCst), 1);
}

fn scalable_result(name: &str) -> AnalysisResult {
    AnalysisResult {
        instance: InstanceDescriptor {
            name: name.to_string(),
            project: "acme".to_string(),
            database_version: "POSTGRES_15".to_string(),
            tier: "db-n1-standard-2".to_string(),
            edition: Edition::EnterprisePlus,
            state: "RUNNABLE".to_string(),
            region: "us-central1".to_string(),
            zone: None,
            high_availability: false,
            backup_enabled: false,
            last_scaled_at: None,
        },
        summary: MetricsSummary {
            cpu_p95: 92.0,
            memory_p95_pct: 40.0,
            ..Default::default()
        },
        decision: ScalingDecision::scale(
            "db-n1-standard-2",
            "db-n1-standard-4",
            ScaleDirection::Up,
            "High resource utilization detected",
            DowntimeAssessment::none(),
            -69.0,
        ),
        warnings: Vec::new(),
        scaling_window: None,
        estimated_downtime_secs: 0,
        analyzed_at: Utc::now(),
    }
}

#[derive(Default)]
struct MockAnalysis {
    instances: Vec<String>,
    fail_analysis: bool,
    failing_applies: Vec<String>,
    rejected: Vec<String>,
    applied: Mutex<Vec<String>>,
}

#[async_trait]
impl ProjectAnalysis for MockAnalysis {
    async fn analyze_all(
        &self,
        _shutdown: &ShutdownSignal,
    ) -> Result<ProjectAnalysisResult, AnalyzerError> {
        if self.fail_analysis {
            return Err(listing_error());
        }
        let results = self.instances.iter().map(|n| scalable_result(n)).collect();
        Ok(ProjectAnalysisResult::new(
            "acme".to_string(),
            self.instances.len() + 1,
            results,
            vec![crate::analyzer::InstanceFailure {
                instance: "broken-db".to_string(),
                error: "no metrics".to_string(),
            }],
        ))
    }

    async fn apply_scaling(
        &self,
        instance: &str,
        decision: &ScalingDecision,
        _shutdown: &ShutdownSignal,
    ) -> Result<ApplyOutcome, AnalyzerError> {
        if self.failing_applies.iter().any(|n| n == instance) {
            return Err(AnalyzerError::Apply {
                instance: instance.to_string(),
                tier: decision.target_tier().to_string(),
                source: SourceError::Backend {
                    status: 409,
                    body: "operation in progress".to_string(),
                },
            });
        }
        if self.rejected.iter().any(|n| n == instance) {
            return Ok(ApplyOutcome::Rejected {
                reason: "Scaling would cause downtime".to_string(),
            });
        }
        self.applied.lock().unwrap().push(instance.to_string());
        Ok(ApplyOutcome::Applied)
    }
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_runner_applies_scalable_instances() {
    let analysis = Arc::new(MockAnalysis {
        instances: names(&["orders-db", "users-db", "audit-db"]),
        rejected: names(&["audit-db"]),
        ..Default::default()
    });
    let runner = AutoscalingRunner::new(analysis.clone(), Arc::new(NoopReporter), "acme", false);
    let (_trigger, signal) = shutdown_channel();

    let report = runner.run_cycle(&signal).await.unwrap();

    assert_eq!(report.total_instances, 4);
    assert_eq!(report.analyzed_instances, 3);
    assert_eq!(report.failed_instances, 1);
    assert_eq!(report.scalable_instances, 3);
    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.apply_failures, 0);
    assert_eq!(*analysis.applied.lock().unwrap(), names(&["orders-db", "users-db"]));
}

#[tokio::test]
async fn test_runner_dry_run_applies_nothing() {
    let analysis = Arc::new(MockAnalysis {
        instances: names(&["orders-db", "users-db"]),
        ..Default::default()
    });
    let runner = AutoscalingRunner::new(analysis.clone(), Arc::new(NoopReporter), "acme", true);
    let (_trigger, signal) = shutdown_channel();

    let report = runner.run_cycle(&signal).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.applied, 0);
    assert_eq!(report.skipped, 2);
    assert!(analysis.applied.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_runner_continues_past_apply_failures() {
    let analysis = Arc::new(MockAnalysis {
        instances: names(&["orders-db", "users-db", "audit-db"]),
        failing_applies: names(&["orders-db"]),
        ..Default::default()
    });
    let reporter = Arc::new(PrometheusReporter::new().unwrap());
    let runner = AutoscalingRunner::new(analysis.clone(), reporter.clone(), "acme", false);
    let (_trigger, signal) = shutdown_channel();

    let err = runner.run_cycle(&signal).await.unwrap_err();

    match err {
        DaemonError::Apply {
            failed, attempted, ..
        } => {
            assert_eq!(failed, 1);
            assert_eq!(attempted, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*analysis.applied.lock().unwrap(), names(&["users-db", "audit-db"]));
    assert!(reporter.encode().unwrap().contains("error_type=\"scaling_failed\""));
}

#[tokio::test]
async fn test_runner_reports_analysis_failure() {
    let analysis = Arc::new(MockAnalysis {
        fail_analysis: true,
        ..Default::default()
    });
    let reporter = Arc::new(PrometheusReporter::new().unwrap());
    let runner = AutoscalingRunner::new(analysis, reporter.clone(), "acme", false);
    let (_trigger, signal) = shutdown_channel();

    let err = runner.run_cycle(&signal).await.unwrap_err();

    assert!(err.is_recoverable());
    let text = reporter.encode().unwrap();
    assert!(text.contains("error_type=\"analysis_error\""));
    assert!(text.contains("sqlscaler_cycles_total 1"));
}

#[tokio::test]
async fn test_runner_stops_applying_after_shutdown() {
    let analysis = Arc::new(MockAnalysis {
        instances: names(&["orders-db", "users-db"]),
        ..Default::default()
    });
    let runner = AutoscalingRunner::new(analysis.clone(), Arc::new(NoopReporter), "acme", false);
    let (trigger, signal) = shutdown_channel();
    trigger.trigger();

    let report = runner.run_cycle(&signal).await.unwrap();

    assert_eq!(report.applied, 0);
    assert!(analysis.applied.lock().unwrap().is_empty());
}

struct PanickingAnalysis;

#[async_trait]
impl ProjectAnalysis for PanickingAnalysis {
    async fn analyze_all(
        &self,
        _shutdown: &ShutdownSignal,
    ) -> Result<ProjectAnalysisResult, AnalyzerError> {
        panic!("analysis blew up");
    }

    async fn apply_scaling(
        &self,
        _instance: &str,
        _decision: &ScalingDecision,
        _shutdown: &ShutdownSignal,
    ) -> Result<ApplyOutcome, AnalyzerError> {
        Ok(ApplyOutcome::Applied)
    }
}

#[tokio::test]
async fn test_runner_records_cycle_when_analysis_panics() {
    let reporter = Arc::new(PrometheusReporter::new().unwrap());
    let runner = AutoscalingRunner::new(Arc::new(PanickingAnalysis), reporter.clone(), "acme", false);
    let (_trigger, signal) = shutdown_channel();

    let joined = tokio::spawn(async move { runner.run_cycle(&signal).await }).await;

    assert!(joined.unwrap_err().is_panic());
    let text = reporter.encode().unwrap();
    assert!(text.contains("sqlscaler_cycles_total 1"));
    assert!(text.contains("sqlscaler_cycle_duration_seconds"));
}
