//! Statistical summarization of aligned metric series

use crate::models::{MetricSeries, MetricsSummary};
use std::cmp::Ordering;

pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Reduce a metric series to the statistics the rules engine reads.
pub fn summarize(series: &MetricSeries) -> MetricsSummary {
    if series.is_empty() {
        return MetricsSummary::default();
    }

    let memory_gb: Vec<f64> = series.memory_bytes.iter().map(|b| b / BYTES_PER_GB).collect();
    let connections: Vec<f64> = series.connections.iter().map(|c| *c as f64).collect();

    let period_secs = match (series.timestamps.first(), series.timestamps.last()) {
        (Some(first), Some(last)) => (*last - *first).num_seconds(),
        _ => 0,
    };

    MetricsSummary {
        cpu_avg: average(&series.cpu_percent),
        cpu_p95: percentile(&series.cpu_percent, 95.0),
        cpu_p99: percentile(&series.cpu_percent, 99.0),
        cpu_max: maximum(&series.cpu_percent),
        memory_avg_gb: average(&memory_gb),
        memory_p95_gb: percentile(&memory_gb, 95.0),
        memory_p99_gb: percentile(&memory_gb, 99.0),
        memory_max_gb: maximum(&memory_gb),
        memory_avg_pct: average(&series.memory_percent),
        memory_p95_pct: percentile(&series.memory_percent, 95.0),
        memory_p99_pct: percentile(&series.memory_percent, 99.0),
        memory_max_pct: maximum(&series.memory_percent),
        connections_avg: average(&connections),
        connections_max: series.connections.iter().copied().max().unwrap_or(0),
        data_points: series.len(),
        period_secs,
    }
}

/// Arithmetic mean; zero for an empty slice
pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Percentile with linear interpolation between the two nearest ranks.
///
/// `p` is in percent and clamped to 0-100. Returns zero for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (rank.ceil() as usize).min(sorted.len() - 1);
    let weight = rank - lower as f64;

    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Largest value; zero for an empty slice
pub fn maximum(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .reduce(f64::max)
        .unwrap_or(0.0)
}
