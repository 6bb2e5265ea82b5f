//! Scaler library for managed-database vertical autoscaling
//!
//! This crate provides the core functionality for:
//! - Summarizing utilization time series
//! - The machine-type catalog and tier traversal
//! - Threshold and edition-aware scaling decisions
//! - Per-instance and per-project analysis with apply
//! - The autoscaling daemon loop
//! - Health checks and observability

pub mod analyzer;
pub mod catalog;
pub mod cloud;
pub mod config;
pub mod daemon;
pub mod health;
pub mod http;
pub mod models;
pub mod observability;
pub mod rules;
pub mod shutdown;
pub mod source;
pub mod summary;

pub use analyzer::{Analyzer, AnalyzerError, AnalysisResult, ApplyOutcome, ProjectAnalysisResult};
pub use config::{AnalysisConfig, Profile};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MetricsReporter, PrometheusReporter, StructuredLogger};
pub use rules::RulesEngine;
