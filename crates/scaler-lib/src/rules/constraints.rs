//! Edition constraints, advisory warnings and scaling windows

use crate::catalog;
use crate::config::AnalysisConfig;
use crate::models::{InstanceDescriptor, MetricSeries, MetricsSummary, ScalingConstraints};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use serde::Serialize;
use std::time::Duration;

/// Below this share of expected data points a warning is emitted
pub const DATA_COMPLETENESS_THRESHOLD: f64 = 80.0;

/// Hour used when the series is empty
const DEFAULT_LOW_USAGE_HOUR: u32 = 2;
const LOW_USAGE_WINDOW_HOURS: i64 = 2;
const ANY_TIME_WINDOW_HOURS: i64 = 24;

const BASE_DOWNTIME: Duration = Duration::from_secs(5 * 60);
const DOWNTIME_PER_VCPU: Duration = Duration::from_secs(30);

/// Proposed time span for performing a resize
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScalingWindow {
    pub fn duration(&self) -> ChronoDuration {
        self.end - self.start
    }
}

/// Human-readable warnings that do not block a resize.
pub fn advisory_warnings(
    instance: &InstanceDescriptor,
    summary: &MetricsSummary,
    config: &AnalysisConfig,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut warnings = Vec::new();

    let expected = config.expected_data_points();
    if expected > 0 {
        let completeness = summary.data_points as f64 / expected as f64 * 100.0;
        if completeness < DATA_COMPLETENESS_THRESHOLD {
            warnings.push(format!(
                "Limited metrics data available ({completeness:.1}% complete). Recommendations may be less accurate."
            ));
        }
    }

    let min_stable = config.min_stable_duration.as_secs() as i64;
    if summary.data_points > 0 && summary.period_secs < min_stable {
        warnings.push(format!(
            "Metrics span only {} which is shorter than the {} needed to confirm sustained load.",
            format_duration(Duration::from_secs(summary.period_secs.max(0) as u64)),
            format_duration(config.min_stable_duration)
        ));
    }

    if let Some(last_scaled) = instance.last_scaled_at {
        let since = now - last_scaled;
        if let Ok(cool_down) = ChronoDuration::from_std(config.cool_down_period) {
            if since < cool_down {
                warnings.push(format!(
                    "Instance was scaled recently ({} minutes ago). Consider waiting for cooldown period.",
                    since.num_minutes().max(0)
                ));
            }
        }
    }

    if instance.high_availability {
        warnings.push(
            "Instance has high availability enabled. Scaling will affect both primary and standby instances."
                .to_string(),
        );
    }

    if instance.backup_enabled {
        warnings.push(
            "Instance has backups enabled. Avoid scaling during backup windows.".to_string(),
        );
    }

    warnings
}

/// Hour of day (UTC) with the lowest average CPU utilization.
///
/// Ties go to the earliest hour. An empty series yields 02:00.
pub fn lowest_usage_hour(series: &MetricSeries) -> u32 {
    let mut sums = [0.0_f64; 24];
    let mut counts = [0_u32; 24];
    for (timestamp, cpu) in series.timestamps.iter().zip(&series.cpu_percent) {
        let hour = timestamp.hour() as usize;
        sums[hour] += cpu;
        counts[hour] += 1;
    }

    let mut best: Option<(u32, f64)> = None;
    for hour in 0..24 {
        if counts[hour] == 0 {
            continue;
        }
        let avg = sums[hour] / counts[hour] as f64;
        if best.map_or(true, |(_, lowest)| avg < lowest) {
            best = Some((hour as u32, avg));
        }
    }

    best.map(|(hour, _)| hour).unwrap_or(DEFAULT_LOW_USAGE_HOUR)
}

/// When to perform a resize.
///
/// Editions that resize without downtime can scale any time in the next
/// day. Otherwise the window is two hours starting at the next occurrence
/// of the lowest-usage hour at or after `now`.
pub fn optimal_scaling_window(
    series: &MetricSeries,
    constraints: &ScalingConstraints,
    now: DateTime<Utc>,
) -> ScalingWindow {
    if !constraints.downtime_on_scale {
        return ScalingWindow {
            start: now,
            end: now + ChronoDuration::hours(ANY_TIME_WINDOW_HOURS),
        };
    }

    let hour = lowest_usage_hour(series);
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now);

    let mut start = midnight + ChronoDuration::hours(hour as i64);
    if start < now {
        start += ChronoDuration::days(1);
    }

    ScalingWindow {
        start,
        end: start + ChronoDuration::hours(LOW_USAGE_WINDOW_HOURS),
    }
}

/// Expected restart time of a resize that causes downtime: five minutes
/// plus thirty seconds per vCPU of the larger tier. Unknown tiers count as
/// zero vCPUs.
pub fn estimate_downtime(current_tier: &str, target_tier: &str) -> Duration {
    let cpu = |tier: &str| catalog::lookup(tier).map(|m| m.cpu).unwrap_or(0);
    let max_cpu = cpu(current_tier).max(cpu(target_tier));
    BASE_DOWNTIME + DOWNTIME_PER_VCPU * max_cpu
}

/// Render a duration as `3h`, `30m`, `1h30m` or `45s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{seconds}s"));
    }
    out
}
