use super::AnalysisResult;
use crate::models::ScaleDirection;
use serde::Serialize;

/// Savings above which a resize gets a priority bonus, USD per month
const SAVINGS_PRIORITY_THRESHOLD: f64 = 100.0;

/// An instance that could not be analyzed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceFailure {
    pub instance: String,
    pub error: String,
}

/// Outcome of analyzing every instance in a project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectAnalysisResult {
    pub project_id: String,
    pub results: Vec<AnalysisResult>,
    pub total_instances: usize,
    pub analyzed_instances: usize,
    pub failures: Vec<InstanceFailure>,
}

impl ProjectAnalysisResult {
    pub fn new(
        project_id: String,
        total_instances: usize,
        results: Vec<AnalysisResult>,
        failures: Vec<InstanceFailure>,
    ) -> Self {
        Self {
            project_id,
            analyzed_instances: results.len(),
            results,
            total_instances,
            failures,
        }
    }

    /// Results that recommend a tier change
    pub fn scalable(&self) -> Vec<&AnalysisResult> {
        self.results
            .iter()
            .filter(|r| r.decision.should_scale)
            .collect()
    }

    pub fn total_estimated_savings(&self) -> f64 {
        self.scalable()
            .iter()
            .map(|r| r.decision.estimated_monthly_savings)
            .sum()
    }

    /// Scalable instances ordered by descending priority. Equal priorities
    /// keep their analysis order.
    pub fn scaling_plan(&self) -> ScalingPlan {
        let mut operations: Vec<ScalingOperation> = self
            .scalable()
            .into_iter()
            .map(ScalingOperation::from_result)
            .collect();
        operations.sort_by(|a, b| b.priority.cmp(&a.priority));
        ScalingPlan { operations }
    }
}

/// One planned tier change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingOperation {
    pub instance: String,
    pub current_tier: String,
    pub target_tier: String,
    pub direction: Option<ScaleDirection>,
    pub reason: String,
    pub downtime_expected: bool,
    pub estimated_monthly_savings: f64,
    pub priority: u32,
}

impl ScalingOperation {
    fn from_result(result: &AnalysisResult) -> Self {
        let decision = &result.decision;
        Self {
            instance: result.instance.name.clone(),
            current_tier: decision.current_tier.clone(),
            target_tier: decision.target_tier().to_string(),
            direction: decision.direction,
            reason: decision.reason.clone(),
            downtime_expected: decision.downtime_expected,
            estimated_monthly_savings: decision.estimated_monthly_savings,
            priority: priority_score(result),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScalingPlan {
    pub operations: Vec<ScalingOperation>,
}

impl ScalingPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn total_estimated_savings(&self) -> f64 {
        self.operations
            .iter()
            .map(|op| op.estimated_monthly_savings)
            .sum()
    }
}

/// Urgency of a resize.
///
/// Utilization above 90% scores 50 and above 80% scores 30; a resize
/// without downtime adds 20 and savings over $100/month add 10.
pub fn priority_score(result: &AnalysisResult) -> u32 {
    let summary = &result.summary;
    let decision = &result.decision;
    let mut priority = 0;

    if summary.cpu_p95 > 90.0 || summary.memory_p95_pct > 90.0 {
        priority += 50;
    } else if summary.cpu_p95 > 80.0 || summary.memory_p95_pct > 80.0 {
        priority += 30;
    }

    if !decision.downtime_expected {
        priority += 20;
    }

    if decision.estimated_monthly_savings > SAVINGS_PRIORITY_THRESHOLD {
        priority += 10;
    }

    priority
}
