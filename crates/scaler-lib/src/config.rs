//! Analysis configuration and scaling profiles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const HOUR: u64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("project id is required")]
    MissingProjectId,

    #[error("{name} must be between 0 and 1, got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("scale-up threshold ({up}) must be greater than scale-down threshold ({down})")]
    InvertedThresholds { up: f64, down: f64 },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("unknown profile '{0}', expected one of: default, conservative, aggressive")]
    UnknownProfile(String),
}

/// Named threshold and timing preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Default,
    /// Scales up late and down early, looks back two weeks
    Conservative,
    /// Scales up early and down late, looks back three days
    Aggressive,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Default => "default",
            Profile::Conservative => "conservative",
            Profile::Aggressive => "aggressive",
        }
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Profile::Default),
            "conservative" => Ok(Profile::Conservative),
            "aggressive" => Ok(Profile::Aggressive),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for analyzing a project's instances
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub project_id: String,
    /// How far back metrics are fetched
    pub lookback: Duration,
    /// Alignment period of fetched metric points
    pub granularity: Duration,
    /// P95 utilization fraction (0-1) above which an instance scales up
    pub scale_up_threshold: f64,
    /// P95 utilization fraction (0-1) below which an instance scales down
    pub scale_down_threshold: f64,
    /// Minimum span of metrics considered sustained load
    pub min_stable_duration: Duration,
    /// Advisory wait after a resize before another one
    pub cool_down_period: Duration,
    pub dry_run: bool,
    /// Apply decisions that would cause downtime
    pub force: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            lookback: Duration::from_secs(7 * 24 * HOUR),
            granularity: Duration::from_secs(5 * 60),
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.5,
            min_stable_duration: Duration::from_secs(HOUR),
            cool_down_period: Duration::from_secs(30 * 60),
            dry_run: false,
            force: false,
        }
    }
}

impl AnalysisConfig {
    pub fn for_profile(profile: Profile) -> Self {
        let base = Self::default();
        match profile {
            Profile::Default => base,
            Profile::Conservative => Self {
                scale_up_threshold: 0.9,
                scale_down_threshold: 0.3,
                min_stable_duration: Duration::from_secs(2 * HOUR),
                lookback: Duration::from_secs(14 * 24 * HOUR),
                ..base
            },
            Profile::Aggressive => Self {
                scale_up_threshold: 0.7,
                scale_down_threshold: 0.6,
                min_stable_duration: Duration::from_secs(30 * 60),
                lookback: Duration::from_secs(3 * 24 * HOUR),
                ..base
            },
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Number of points a complete lookback window would contain
    pub fn expected_data_points(&self) -> u64 {
        let step = self.granularity.as_secs();
        if step == 0 {
            return 0;
        }
        self.lookback.as_secs() / step
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::MissingProjectId);
        }
        for (name, value) in [
            ("scale-up threshold", self.scale_up_threshold),
            ("scale-down threshold", self.scale_down_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.scale_up_threshold <= self.scale_down_threshold {
            return Err(ConfigError::InvertedThresholds {
                up: self.scale_up_threshold,
                down: self.scale_down_threshold,
            });
        }
        if self.lookback.is_zero() {
            return Err(ConfigError::ZeroDuration("lookback period"));
        }
        if self.granularity.is_zero() {
            return Err(ConfigError::ZeroDuration("metrics granularity"));
        }
        Ok(())
    }
}
