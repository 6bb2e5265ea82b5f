//! Time-series reads through the Cloud Monitoring REST API

use super::RestClient;
use crate::models::MetricPoints;
use crate::source::{MetricsSource, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TimeSeriesPage {
    time_series: Vec<TimeSeries>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimeSeries {
    points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct Point {
    interval: PointInterval,
    #[serde(default)]
    value: TypedValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointInterval {
    end_time: DateTime<Utc>,
}

/// int64 values arrive as JSON strings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TypedValue {
    double_value: Option<f64>,
    int64_value: Option<String>,
}

impl TypedValue {
    fn as_f64(&self) -> f64 {
        if let Some(value) = self.double_value {
            return value;
        }
        self.int64_value
            .as_deref()
            .and_then(|v| v.parse::<i64>().ok())
            .map(|v| v as f64)
            .unwrap_or(0.0)
    }
}

/// Monitoring API adapter scoped to one project
pub struct MonitoringClient {
    rest: RestClient,
    project: String,
}

impl MonitoringClient {
    pub fn new(rest: RestClient, project: impl Into<String>) -> Self {
        Self {
            rest,
            project: project.into(),
        }
    }

    fn filter(&self, instance: &str, metric: &str) -> String {
        format!(
            r#"resource.type="cloudsql_database" AND resource.labels.database_id="{}:{}" AND metric.type="{}""#,
            self.project, instance, metric
        )
    }
}

#[async_trait]
impl MetricsSource for MonitoringClient {
    async fn fetch(
        &self,
        instance: &str,
        metric: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        alignment: Duration,
    ) -> Result<MetricPoints, SourceError> {
        let path = format!("v3/projects/{}/timeSeries", self.project);
        let base_query = vec![
            ("filter", self.filter(instance, metric)),
            ("interval.startTime", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("interval.endTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("aggregation.alignmentPeriod", format!("{}s", alignment.as_secs().max(1))),
            ("aggregation.perSeriesAligner", "ALIGN_MEAN".to_string()),
            ("aggregation.crossSeriesReducer", "REDUCE_MEAN".to_string()),
        ];

        let mut points = MetricPoints::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = base_query.clone();
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let page: TimeSeriesPage = match self.rest.get(&path, &query).await {
                Ok(page) => page,
                // No series recorded for this metric yet
                Err(SourceError::Backend { status: 404, .. }) => break,
                Err(e) => return Err(e),
            };

            for series in page.time_series {
                for point in series.points {
                    points.insert(point.interval.end_time, point.value.as_f64());
                }
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(instance = %instance, metric = %metric, points = points.len(), "Fetched metric");
        Ok(points)
    }
}
