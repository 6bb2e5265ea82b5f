use super::*;
use crate::models::{Edition, OperationRecord, OperationStatus, ScaleDirection};
use crate::shutdown::shutdown_channel;
use chrono::Duration as ChronoDuration;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn descriptor(name: &str, tier: &str, edition: Edition) -> InstanceDescriptor {
    InstanceDescriptor {
        name: name.to_string(),
        project: "acme".to_string(),
        database_version: "POSTGRES_15".to_string(),
        tier: tier.to_string(),
        edition,
        state: "RUNNABLE".to_string(),
        region: "us-central1".to_string(),
        zone: Some("us-central1-b".to_string()),
        high_availability: false,
        backup_enabled: false,
        last_scaled_at: None,
    }
}

fn update_op(id: &str, status: OperationStatus, ended: DateTime<Utc>) -> OperationRecord {
    OperationRecord {
        id: id.to_string(),
        operation_type: "UPDATE".to_string(),
        status,
        insert_time: Some(ended - ChronoDuration::minutes(2)),
        end_time: Some(ended),
        error: None,
    }
}

#[derive(Default)]
struct MockController {
    instances: Vec<InstanceDescriptor>,
    operations: HashMap<String, Vec<OperationRecord>>,
    fail_list: bool,
    fail_operations: bool,
    fail_update: bool,
    updates: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl InstanceController for MockController {
    async fn get(&self, instance: &str) -> Result<InstanceDescriptor, SourceError> {
        self.instances
            .iter()
            .find(|d| d.name == instance)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(instance.to_string()))
    }

    async fn list(&self, _project: &str) -> Result<Vec<InstanceDescriptor>, SourceError> {
        if self.fail_list {
            return Err(SourceError::Backend {
                status: 403,
                body: "permission denied".to_string(),
            });
        }
        Ok(self.instances.clone())
    }

    async fn update_tier(
        &self,
        instance: &str,
        tier: &str,
        _shutdown: &ShutdownSignal,
    ) -> Result<(), SourceError> {
        if self.fail_update {
            return Err(SourceError::OperationFailed {
                id: "op-9".to_string(),
                message: "quota exceeded".to_string(),
            });
        }
        self.updates
            .lock()
            .unwrap()
            .push((instance.to_string(), tier.to_string()));
        Ok(())
    }

    async fn recent_operations(
        &self,
        instance: &str,
        _limit: usize,
    ) -> Result<Vec<OperationRecord>, SourceError> {
        if self.fail_operations {
            return Err(SourceError::Decode("bad json".to_string()));
        }
        Ok(self.operations.get(instance).cloned().unwrap_or_default())
    }
}

/// Constant utilization per instance, `points` samples ending at `end`
struct MockMetrics {
    utilization: HashMap<String, (f64, f64)>,
    points: usize,
    failing_metrics: HashSet<&'static str>,
    failing_instances: HashSet<String>,
    calls: AtomicUsize,
}

impl MockMetrics {
    fn new(points: usize) -> Self {
        Self {
            utilization: HashMap::new(),
            points,
            failing_metrics: HashSet::new(),
            failing_instances: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn with(mut self, instance: &str, cpu: f64, memory: f64) -> Self {
        self.utilization.insert(instance.to_string(), (cpu, memory));
        self
    }
}

#[async_trait]
impl MetricsSource for MockMetrics {
    async fn fetch(
        &self,
        instance: &str,
        metric: &str,
        _start: DateTime<Utc>,
        end: DateTime<Utc>,
        alignment: Duration,
    ) -> Result<MetricPoints, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_instances.contains(instance) || self.failing_metrics.contains(metric) {
            return Err(SourceError::Backend {
                status: 500,
                body: "backend unavailable".to_string(),
            });
        }

        let (cpu, memory) = self.utilization.get(instance).copied().unwrap_or((0.5, 0.5));
        let value = match metric {
            metric_names::CPU_UTILIZATION => cpu,
            metric_names::MEMORY_UTILIZATION => memory,
            metric_names::MEMORY_USAGE => 4.0 * 1024.0 * 1024.0 * 1024.0,
            _ => 25.0,
        };
        let step = ChronoDuration::from_std(alignment).unwrap();
        Ok((0..self.points)
            .map(|i| (end - step * i as i32, value))
            .collect())
    }
}

fn analyzer(controller: MockController, metrics: MockMetrics, config: AnalysisConfig) -> Analyzer {
    Analyzer::new(Arc::new(controller), Arc::new(metrics), config)
}

fn config() -> AnalysisConfig {
    AnalysisConfig::default().with_project("acme")
}

#[tokio::test]
async fn test_analyze_instance_recommends_scale_up() {
    let controller = MockController {
        instances: vec![descriptor("orders-db", "db-n1-standard-2", Edition::EnterprisePlus)],
        ..Default::default()
    };
    let metrics = MockMetrics::new(100).with("orders-db", 0.95, 0.40);

    let result = analyzer(controller, metrics, config())
        .analyze_instance("orders-db")
        .await
        .unwrap();

    assert_eq!(result.summary.data_points, 100);
    assert!((result.summary.cpu_p95 - 95.0).abs() < 1e-9);
    assert_eq!(result.summary.memory_avg_gb, 4.0);
    assert_eq!(result.summary.connections_max, 25);
    assert!(result.decision.should_scale);
    assert_eq!(result.decision.direction, Some(ScaleDirection::Up));
    assert_eq!(result.decision.target_tier(), "db-n1-standard-4");
    assert!(result.scaling_window.is_some());
    assert_eq!(result.estimated_downtime_secs, 0);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.starts_with("Limited metrics data available")));
}

#[tokio::test]
async fn test_hold_has_no_window() {
    let controller = MockController {
        instances: vec![descriptor("orders-db", "db-n1-standard-2", Edition::EnterprisePlus)],
        ..Default::default()
    };
    let metrics = MockMetrics::new(2016).with("orders-db", 0.65, 0.60);

    let result = analyzer(controller, metrics, config())
        .analyze_instance("orders-db")
        .await
        .unwrap();

    assert!(!result.decision.should_scale);
    assert!(result.scaling_window.is_none());
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[tokio::test]
async fn test_enterprise_reports_downtime_estimate() {
    let controller = MockController {
        instances: vec![descriptor("billing-db", "db-n1-standard-4", Edition::Enterprise)],
        ..Default::default()
    };
    let metrics = MockMetrics::new(100).with("billing-db", 0.10, 0.10);

    let result = analyzer(controller, metrics, config())
        .analyze_instance("billing-db")
        .await
        .unwrap();

    assert_eq!(result.decision.target_tier(), "db-n1-standard-2");
    assert!(result.decision.downtime_expected);
    assert_eq!(result.estimated_downtime_secs, 300 + 4 * 30);
}

#[tokio::test]
async fn test_missing_instance_is_error() {
    let err = analyzer(MockController::default(), MockMetrics::new(10), config())
        .analyze_instance("ghost")
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::Instance { ref instance, .. } if instance == "ghost"));
}

#[tokio::test]
async fn test_required_metric_failure_is_error() {
    let controller = MockController {
        instances: vec![descriptor("orders-db", "db-n1-standard-2", Edition::EnterprisePlus)],
        ..Default::default()
    };
    let mut metrics = MockMetrics::new(100);
    metrics.failing_metrics.insert(metric_names::MEMORY_UTILIZATION);

    let err = analyzer(controller, metrics, config())
        .analyze_instance("orders-db")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnalyzerError::Metrics { metric, .. } if metric == metric_names::MEMORY_UTILIZATION
    ));
}

#[tokio::test]
async fn test_optional_metric_failure_is_tolerated() {
    let controller = MockController {
        instances: vec![descriptor("orders-db", "db-n1-standard-2", Edition::EnterprisePlus)],
        ..Default::default()
    };
    let mut metrics = MockMetrics::new(100);
    metrics.failing_metrics.insert(metric_names::MEMORY_USAGE);
    metrics.failing_metrics.insert(metric_names::POSTGRES_CONNECTIONS);

    let result = analyzer(controller, metrics, config())
        .analyze_instance("orders-db")
        .await
        .unwrap();
    assert_eq!(result.summary.data_points, 100);
    assert_eq!(result.summary.memory_max_gb, 0.0);
    assert_eq!(result.summary.connections_max, 0);
}

#[tokio::test]
async fn test_last_scaled_time_uses_latest_completed_update() {
    let now = Utc::now();
    let mut failed = update_op("op-4", OperationStatus::Done, now - ChronoDuration::minutes(1));
    failed.error = Some("tier unavailable".to_string());
    let mut backup = update_op("op-5", OperationStatus::Done, now - ChronoDuration::minutes(3));
    backup.operation_type = "BACKUP_VOLUME".to_string();

    let operations = vec![
        update_op("op-3", OperationStatus::Running, now),
        failed,
        backup,
        update_op("op-2", OperationStatus::Done, now - ChronoDuration::minutes(10)),
        update_op("op-1", OperationStatus::Done, now - ChronoDuration::days(2)),
    ];
    let controller = MockController {
        operations: HashMap::from([("orders-db".to_string(), operations)]),
        ..Default::default()
    };

    let last = analyzer(controller, MockMetrics::new(0), config())
        .last_scaled_time("orders-db")
        .await;
    assert_eq!(last, Some(now - ChronoDuration::minutes(10)));
}

#[tokio::test]
async fn test_last_scaled_time_failure_is_none() {
    let controller = MockController {
        fail_operations: true,
        ..Default::default()
    };
    let last = analyzer(controller, MockMetrics::new(0), config())
        .last_scaled_time("orders-db")
        .await;
    assert_eq!(last, None);
}

#[tokio::test]
async fn test_recent_resize_feeds_downtime_window() {
    let recent = update_op(
        "op-1",
        OperationStatus::Done,
        Utc::now() - ChronoDuration::minutes(10),
    );
    let controller = MockController {
        instances: vec![descriptor("orders-db", "db-n1-standard-2", Edition::EnterprisePlus)],
        operations: HashMap::from([("orders-db".to_string(), vec![recent])]),
        ..Default::default()
    };
    let metrics = MockMetrics::new(100).with("orders-db", 0.95, 0.40);

    let result = analyzer(controller, metrics, config())
        .analyze_instance("orders-db")
        .await
        .unwrap();

    assert!(result.instance.last_scaled_at.is_some());
    assert!(result.decision.downtime_expected);
    assert_eq!(result.decision.downtime_wait_minutes, Some(20));
    assert!(result.warnings.iter().any(|w| w.contains("scaled recently")));
}

#[tokio::test]
async fn test_analyze_all_records_failures() {
    let controller = MockController {
        instances: vec![
            descriptor("orders-db", "db-n1-standard-2", Edition::EnterprisePlus),
            descriptor("billing-db", "db-n1-standard-4", Edition::Enterprise),
            descriptor("events-db", "db-e2-standard-2", Edition::EnterprisePlus),
        ],
        ..Default::default()
    };
    let mut metrics = MockMetrics::new(100)
        .with("orders-db", 0.95, 0.40)
        .with("events-db", 0.65, 0.65);
    metrics.failing_instances.insert("billing-db".to_string());

    let (_trigger, signal) = shutdown_channel();
    let result = analyzer(controller, metrics, config())
        .analyze_all(&signal)
        .await
        .unwrap();

    assert_eq!(result.project_id, "acme");
    assert_eq!(result.total_instances, 3);
    assert_eq!(result.analyzed_instances, 2);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].instance, "billing-db");
    assert_eq!(result.scalable().len(), 1);
    assert_eq!(result.scalable()[0].instance.name, "orders-db");
}

#[tokio::test]
async fn test_analyze_all_listing_error() {
    let controller = MockController {
        fail_list: true,
        ..Default::default()
    };
    let (_trigger, signal) = shutdown_channel();
    let err = analyzer(controller, MockMetrics::new(100), config())
        .analyze_all(&signal)
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::Listing { ref project, .. } if project == "acme"));
}

#[tokio::test]
async fn test_analyze_all_stops_on_shutdown() {
    let controller = MockController {
        instances: vec![
            descriptor("orders-db", "db-n1-standard-2", Edition::EnterprisePlus),
            descriptor("events-db", "db-e2-standard-2", Edition::EnterprisePlus),
        ],
        ..Default::default()
    };
    let metrics = Arc::new(MockMetrics::new(100));
    let analyzer = Analyzer::new(Arc::new(controller), metrics.clone(), config());

    let (trigger, signal) = shutdown_channel();
    trigger.trigger();
    let result = analyzer.analyze_all(&signal).await.unwrap();

    assert_eq!(result.total_instances, 2);
    assert_eq!(result.analyzed_instances, 0);
    assert_eq!(metrics.calls.load(Ordering::SeqCst), 0);
}

fn scale_up_decision() -> ScalingDecision {
    ScalingDecision::scale(
        "db-n1-standard-2",
        "db-n1-standard-4",
        ScaleDirection::Up,
        "busy",
        crate::models::DowntimeAssessment::none(),
        -150.0,
    )
}

fn downtime_decision() -> ScalingDecision {
    ScalingDecision::scale(
        "db-n1-standard-4",
        "db-n1-standard-2",
        ScaleDirection::Down,
        "idle",
        crate::models::DowntimeAssessment::always("restart required"),
        150.0,
    )
}

#[tokio::test]
async fn test_apply_rejects_hold() {
    let controller = Arc::new(MockController::default());
    let analyzer = Analyzer::new(controller.clone(), Arc::new(MockMetrics::new(0)), config());
    let (_trigger, signal) = shutdown_channel();

    let outcome = analyzer
        .apply_scaling("orders-db", &ScalingDecision::hold("db-n1-standard-2", "fine"), &signal)
        .await
        .unwrap();

    assert!(matches!(outcome, ApplyOutcome::Rejected { .. }));
    assert!(controller.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_rejects_downtime_without_force() {
    let controller = Arc::new(MockController::default());
    let analyzer = Analyzer::new(controller.clone(), Arc::new(MockMetrics::new(0)), config());
    let (_trigger, signal) = shutdown_channel();

    let outcome = analyzer
        .apply_scaling("billing-db", &downtime_decision(), &signal)
        .await
        .unwrap();

    match outcome {
        ApplyOutcome::Rejected { reason } => assert!(reason.contains("restart required")),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(controller.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_with_force_updates_tier() {
    let controller = Arc::new(MockController::default());
    let forced = AnalysisConfig {
        force: true,
        ..config()
    };
    let analyzer = Analyzer::new(controller.clone(), Arc::new(MockMetrics::new(0)), forced);
    let (_trigger, signal) = shutdown_channel();

    let outcome = analyzer
        .apply_scaling("billing-db", &downtime_decision(), &signal)
        .await
        .unwrap();

    assert_eq!(outcome, ApplyOutcome::Applied);
    assert_eq!(
        *controller.updates.lock().unwrap(),
        vec![("billing-db".to_string(), "db-n1-standard-2".to_string())]
    );
}

#[tokio::test]
async fn test_apply_dry_run_skips_update() {
    let controller = Arc::new(MockController::default());
    let dry = AnalysisConfig {
        dry_run: true,
        ..config()
    };
    let analyzer = Analyzer::new(controller.clone(), Arc::new(MockMetrics::new(0)), dry);
    let (_trigger, signal) = shutdown_channel();

    let outcome = analyzer
        .apply_scaling("orders-db", &scale_up_decision(), &signal)
        .await
        .unwrap();

    assert_eq!(outcome, ApplyOutcome::DryRun);
    assert!(controller.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_update_failure_is_error() {
    let controller = MockController {
        fail_update: true,
        ..Default::default()
    };
    let (_trigger, signal) = shutdown_channel();
    let err = analyzer(controller, MockMetrics::new(0), config())
        .apply_scaling("orders-db", &scale_up_decision(), &signal)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalyzerError::Apply { ref tier, .. } if tier == "db-n1-standard-4"
    ));
}

fn planned(name: &str, cpu_p95: f64, downtime: bool, savings: f64) -> AnalysisResult {
    let mut decision = scale_up_decision();
    decision.downtime_expected = downtime;
    decision.estimated_monthly_savings = savings;
    AnalysisResult {
        instance: descriptor(name, "db-n1-standard-2", Edition::EnterprisePlus),
        summary: MetricsSummary {
            cpu_p95,
            data_points: 100,
            ..Default::default()
        },
        decision,
        warnings: Vec::new(),
        scaling_window: None,
        estimated_downtime_secs: 0,
        analyzed_at: Utc::now(),
    }
}

#[test]
fn test_priority_score() {
    assert_eq!(priority_score(&planned("a", 95.0, false, 0.0)), 70);
    assert_eq!(priority_score(&planned("b", 85.0, true, 0.0)), 30);
    assert_eq!(priority_score(&planned("c", 20.0, false, 150.0)), 30);
    assert_eq!(priority_score(&planned("d", 20.0, true, 100.0)), 0);
}

#[test]
fn test_scaling_plan_orders_by_priority() {
    let hold = AnalysisResult {
        decision: ScalingDecision::hold("db-n1-standard-2", "fine"),
        ..planned("idle-db", 50.0, false, 0.0)
    };
    let result = ProjectAnalysisResult::new(
        "acme".to_string(),
        5,
        vec![
            planned("warm-db", 85.0, true, 0.0),
            hold,
            planned("hot-db", 95.0, true, 0.0),
            planned("cheap-db", 20.0, false, 200.0),
            planned("also-warm-db", 82.0, true, 0.0),
        ],
        Vec::new(),
    );

    let plan = result.scaling_plan();
    let order: Vec<&str> = plan.operations.iter().map(|op| op.instance.as_str()).collect();
    assert_eq!(order, vec!["hot-db", "warm-db", "cheap-db", "also-warm-db"]);
    assert_eq!(plan.operations[0].priority, 50);
    assert_eq!(plan.operations[0].target_tier, "db-n1-standard-4");
    assert!((plan.total_estimated_savings() - 200.0).abs() < 1e-9);
}
