//! Daemon configuration

use anyhow::{Context, Result};
use scaler_lib::cloud::{MONITORING_BASE_URL, SQLADMIN_BASE_URL};
use scaler_lib::config::{AnalysisConfig, Profile};
use scaler_lib::daemon::DaemonConfig;
use serde::Deserialize;
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSettings {
    /// Project whose instances are managed
    #[serde(default = "default_project_id")]
    pub project_id: String,

    /// Threshold preset, refined by the overrides below
    #[serde(default)]
    pub profile: Profile,

    /// Seconds between autoscaling cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_true")]
    pub http_enabled: bool,

    /// API server port for health/status/metrics
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Analyze without changing any instance
    #[serde(default)]
    pub dry_run: bool,

    /// Apply resizes even when they cause downtime
    #[serde(default)]
    pub force: bool,

    pub scale_up_threshold: Option<f64>,
    pub scale_down_threshold: Option<f64>,
    pub lookback_hours: Option<u64>,
    pub min_stable_minutes: Option<u64>,

    /// Static bearer token; the metadata server is used when unset
    pub access_token: Option<String>,

    #[serde(default = "default_sqladmin_url")]
    pub sqladmin_url: String,

    #[serde(default = "default_monitoring_url")]
    pub monitoring_url: String,

    /// Timeout for a single API request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_project_id() -> String {
    std::env::var("GOOGLE_CLOUD_PROJECT").unwrap_or_default()
}

fn default_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_http_port() -> u16 {
    8080
}

fn default_sqladmin_url() -> String {
    SQLADMIN_BASE_URL.to_string()
}

fn default_monitoring_url() -> String {
    MONITORING_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl DaemonSettings {
    /// Load configuration from an optional config file and `SCALER_*`
    /// environment variables
    pub fn load() -> Result<Self> {
        let file = std::env::var("SCALER_CONFIG").unwrap_or_else(|_| "sqlscaler".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(config::Environment::with_prefix("SCALER").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid daemon configuration")
    }

    #[cfg(test)]
    fn from_toml(toml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Analysis parameters: the profile preset plus explicit overrides
    pub fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut analysis = AnalysisConfig::for_profile(self.profile).with_project(&self.project_id);
        analysis.dry_run = self.dry_run;
        analysis.force = self.force;

        if let Some(up) = self.scale_up_threshold {
            analysis.scale_up_threshold = up;
        }
        if let Some(down) = self.scale_down_threshold {
            analysis.scale_down_threshold = down;
        }
        if let Some(hours) = self.lookback_hours {
            analysis.lookback = Duration::from_secs(hours * 60 * 60);
        }
        if let Some(minutes) = self.min_stable_minutes {
            analysis.min_stable_duration = Duration::from_secs(minutes * 60);
        }

        analysis.validate().context("Invalid analysis configuration")?;
        Ok(analysis)
    }

    pub fn daemon_config(&self, analysis: &AnalysisConfig) -> DaemonConfig {
        let mut config = DaemonConfig::new(analysis, Duration::from_secs(self.interval_secs));
        if self.http_enabled {
            config = config.with_http_port(self.http_port);
        }
        config.metrics_enabled = self.metrics_enabled;
        config
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
