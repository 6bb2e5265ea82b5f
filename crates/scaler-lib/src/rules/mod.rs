//! Scaling rules engine
//!
//! Turns an instance snapshot and its metrics summary into a scaling
//! decision, and validates decisions before they are applied.

pub mod constraints;

use crate::catalog;
use crate::config::AnalysisConfig;
use crate::models::{
    DowntimeAssessment, InstanceDescriptor, MetricsSummary, ScaleDirection, ScalingDecision,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use constraints::{
    advisory_warnings, estimate_downtime, format_duration, optimal_scaling_window, ScalingWindow,
};

/// Below this many points an instance is never scaled
pub const MIN_DATA_POINTS: usize = 10;

/// On-demand price per vCPU hour, USD
pub const CPU_HOURLY_RATE: f64 = 0.0475;
/// On-demand price per GB of memory per hour, USD
pub const MEMORY_HOURLY_RATE: f64 = 0.0080;
const HOURS_PER_MONTH: f64 = 24.0 * 30.0;

/// P95 utilization thresholds, fractions of 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub scale_up: f64,
    pub scale_down: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            scale_up: 0.8,
            scale_down: 0.5,
        }
    }
}

impl From<&AnalysisConfig> for Thresholds {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            scale_up: config.scale_up_threshold,
            scale_down: config.scale_down_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no scaling recommended for {0}")]
    NotRecommended(String),

    #[error("recommended tier is the same as the current tier ({0})")]
    SameTier(String),

    #[error("scaling would cause downtime: {0}; use force to proceed")]
    DowntimeExpected(String),
}

#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    thresholds: Thresholds,
}

impl RulesEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn analyze(&self, instance: &InstanceDescriptor, summary: &MetricsSummary) -> ScalingDecision {
        self.analyze_at(instance, summary, Utc::now())
    }

    /// Decide whether `instance` should change tier, evaluated at `now`.
    ///
    /// Scale-up is checked first, so an instance that is hot on one
    /// resource and idle on another scales up.
    pub fn analyze_at(
        &self,
        instance: &InstanceDescriptor,
        summary: &MetricsSummary,
        now: DateTime<Utc>,
    ) -> ScalingDecision {
        if summary.data_points < MIN_DATA_POINTS {
            return ScalingDecision::hold(
                &instance.tier,
                format!(
                    "Insufficient metrics data for analysis ({} data points, need at least {MIN_DATA_POINTS})",
                    summary.data_points
                ),
            );
        }

        let direction = if self.should_scale_up(summary) {
            ScaleDirection::Up
        } else if self.should_scale_down(summary) {
            ScaleDirection::Down
        } else {
            return ScalingDecision::hold(
                &instance.tier,
                format!(
                    "Current utilization is within target range (CPU P95: {:.1}%, Memory P95: {:.1}%)",
                    summary.cpu_p95, summary.memory_p95_pct
                ),
            );
        };

        let target = match direction {
            ScaleDirection::Up => catalog::next_larger(&instance.tier),
            ScaleDirection::Down => catalog::next_smaller(&instance.tier),
        };
        let target = match target {
            Ok(target) => target,
            Err(e) => {
                return ScalingDecision::hold(
                    &instance.tier,
                    format!("Cannot scale {direction}: {e}"),
                )
            }
        };

        let reason = match direction {
            ScaleDirection::Up => format!(
                "High resource utilization detected (CPU P95: {:.1}%, Memory P95: {:.1}%)",
                summary.cpu_p95, summary.memory_p95_pct
            ),
            ScaleDirection::Down => format!(
                "Low resource utilization detected (CPU P95: {:.1}%, Memory P95: {:.1}%)",
                summary.cpu_p95, summary.memory_p95_pct
            ),
        };

        let downtime = assess_downtime(instance, direction, now);
        let savings = estimate_monthly_savings(&instance.tier, &target);

        ScalingDecision::scale(&instance.tier, target, direction, reason, downtime, savings)
    }

    fn should_scale_up(&self, summary: &MetricsSummary) -> bool {
        let limit = self.thresholds.scale_up * 100.0;
        summary.cpu_p95 > limit || summary.memory_p95_pct > limit
    }

    fn should_scale_down(&self, summary: &MetricsSummary) -> bool {
        let limit = self.thresholds.scale_down * 100.0;
        summary.cpu_p95 < limit && summary.memory_p95_pct < limit
    }

    /// Check that a decision may be applied.
    ///
    /// Without `force`, decisions that expect downtime are refused.
    pub fn validate(decision: &ScalingDecision, force: bool) -> Result<(), ValidationError> {
        let Some(target) = decision.recommended_tier.as_deref().filter(|_| decision.should_scale)
        else {
            return Err(ValidationError::NotRecommended(decision.current_tier.clone()));
        };
        if target == decision.current_tier {
            return Err(ValidationError::SameTier(target.to_string()));
        }
        if decision.downtime_expected && !force {
            let reason = decision
                .downtime_reason
                .clone()
                .unwrap_or_else(|| "downtime expected".to_string());
            return Err(ValidationError::DowntimeExpected(reason));
        }
        Ok(())
    }
}

/// Downtime impact of resizing `instance` in `direction` at `now`.
pub fn assess_downtime(
    instance: &InstanceDescriptor,
    direction: ScaleDirection,
    now: DateTime<Utc>,
) -> DowntimeAssessment {
    let constraints = instance.edition.constraints();
    if constraints.downtime_on_scale {
        return DowntimeAssessment::always(format!(
            "{} edition requires downtime for all scaling operations",
            instance.edition.display_name()
        ));
    }

    let Some(last_scaled) = instance.last_scaled_at else {
        return DowntimeAssessment::none();
    };

    let (min_interval, action) = match direction {
        ScaleDirection::Up => (constraints.min_upscale_interval, "Scaling up"),
        ScaleDirection::Down => (constraints.min_downscale_interval, "Scaling down"),
    };
    let Ok(window) = chrono::Duration::from_std(min_interval) else {
        return DowntimeAssessment::none();
    };

    let elapsed = now - last_scaled;
    if elapsed >= window {
        return DowntimeAssessment::none();
    }

    let wait_minutes = round_to_minutes(window - elapsed);
    DowntimeAssessment::until(
        format!(
            "{action} within {} of the last scaling operation causes downtime. Wait {wait_minutes} more minutes",
            format_duration(min_interval)
        ),
        wait_minutes,
    )
}

fn round_to_minutes(duration: chrono::Duration) -> i64 {
    (duration.num_milliseconds() + 30_000).div_euclid(60_000)
}

/// Hourly on-demand cost of a tier; zero for unknown tiers
pub fn hourly_cost(tier: &str) -> f64 {
    catalog::lookup(tier)
        .map(|m| m.cpu as f64 * CPU_HOURLY_RATE + m.memory_gb * MEMORY_HOURLY_RATE)
        .unwrap_or(0.0)
}

/// Monthly cost delta of moving from `current` to `recommended`.
/// Positive values are savings.
pub fn estimate_monthly_savings(current: &str, recommended: &str) -> f64 {
    (hourly_cost(current) - hourly_cost(recommended)) * HOURS_PER_MONTH
}
