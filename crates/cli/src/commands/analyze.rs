//! One-shot analysis of a project or selected instances

use anyhow::Result;
use scaler_lib::analyzer::{
    AnalysisResult, Analyzer, ApplyOutcome, InstanceFailure, ProjectAnalysisResult,
};
use scaler_lib::rules::format_duration;
use scaler_lib::shutdown::ShutdownSignal;
use serde::Serialize;
use std::time::Duration;
use tabled::Tabled;

use crate::output::{
    color_utilization, format_bool, format_direction, format_savings, print_error, print_info,
    print_json, print_success, print_table, print_warning, OutputFormat,
};

/// Row for the analysis table
#[derive(Tabled)]
struct AnalysisRow {
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Edition")]
    edition: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "CPU P95")]
    cpu_p95: String,
    #[tabled(rename = "Mem P95")]
    memory_p95: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Downtime")]
    downtime: String,
    #[tabled(rename = "Savings/mo")]
    savings: String,
}

impl From<&AnalysisResult> for AnalysisRow {
    fn from(result: &AnalysisResult) -> Self {
        let decision = &result.decision;
        Self {
            instance: result.instance.name.clone(),
            edition: result.instance.edition.display_name().to_string(),
            tier: decision.current_tier.clone(),
            cpu_p95: color_utilization(result.summary.cpu_p95),
            memory_p95: color_utilization(result.summary.memory_p95_pct),
            action: format_direction(decision.direction),
            target: decision.recommended_tier.clone().unwrap_or_else(|| "-".to_string()),
            downtime: format_bool(decision.downtime_expected),
            savings: format_savings(decision.estimated_monthly_savings),
        }
    }
}

/// Apply outcome of one instance
#[derive(Debug, Serialize)]
struct AppliedChange {
    instance: String,
    target_tier: String,
    #[serde(flatten)]
    outcome: ApplyOutcome,
}

#[derive(Serialize)]
struct AnalyzeReport<'a> {
    #[serde(flatten)]
    analysis: &'a ProjectAnalysisResult,
    total_estimated_savings: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    applied: Vec<AppliedChange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    apply_errors: Vec<InstanceFailure>,
}

async fn collect(
    analyzer: &Analyzer,
    instances: &[String],
    shutdown: &ShutdownSignal,
) -> Result<ProjectAnalysisResult> {
    if instances.is_empty() {
        return Ok(analyzer.analyze_all(shutdown).await?);
    }

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for name in instances {
        if shutdown.is_triggered() {
            break;
        }
        match analyzer.analyze_instance(name).await {
            Ok(result) => results.push(result),
            Err(e) => failures.push(InstanceFailure {
                instance: name.clone(),
                error: e.to_string(),
            }),
        }
    }

    Ok(ProjectAnalysisResult::new(
        analyzer.config().project_id.clone(),
        instances.len(),
        results,
        failures,
    ))
}

/// Analyze, print and optionally apply. Returns false if any instance
/// failed to analyze or to apply.
pub async fn run(
    analyzer: &Analyzer,
    instances: &[String],
    apply: bool,
    shutdown: &ShutdownSignal,
    format: OutputFormat,
) -> Result<bool> {
    let analysis = collect(analyzer, instances, shutdown).await?;

    let mut applied = Vec::new();
    let mut apply_errors = Vec::new();
    if apply {
        for result in analysis.scalable() {
            if shutdown.is_triggered() {
                break;
            }
            let name = &result.instance.name;
            match analyzer.apply_scaling(name, &result.decision, shutdown).await {
                Ok(outcome) => applied.push(AppliedChange {
                    instance: name.clone(),
                    target_tier: result.decision.target_tier().to_string(),
                    outcome,
                }),
                Err(e) => apply_errors.push(InstanceFailure {
                    instance: name.clone(),
                    error: e.to_string(),
                }),
            }
        }
    }

    let succeeded = analysis.failures.is_empty() && apply_errors.is_empty();

    match format {
        OutputFormat::Json => {
            print_json(&AnalyzeReport {
                analysis: &analysis,
                total_estimated_savings: analysis.total_estimated_savings(),
                applied,
                apply_errors,
            })?;
        }
        OutputFormat::Table => {
            print_analysis(&analysis);
            print_applied(&applied, &apply_errors);
            if !apply && !analysis.scalable().is_empty() {
                print_info("Dry run: rerun with --apply to resize these instances");
            }
        }
    }

    Ok(succeeded)
}

fn print_analysis(analysis: &ProjectAnalysisResult) {
    let rows: Vec<AnalysisRow> = analysis.results.iter().map(AnalysisRow::from).collect();
    print_table(rows, "No instances analyzed");

    for result in &analysis.results {
        let decision = &result.decision;
        if decision.should_scale {
            println!("\n{}: {}", result.instance.name, decision.reason);
            if let Some(reason) = &decision.downtime_reason {
                print_warning(reason);
            }
            if result.estimated_downtime_secs > 0 {
                print_warning(&format!(
                    "Estimated downtime: {}",
                    format_duration(Duration::from_secs(result.estimated_downtime_secs))
                ));
            }
            if let Some(window) = &result.scaling_window {
                print_info(&format!(
                    "Suggested window: {} to {}",
                    window.start.format("%Y-%m-%d %H:%M UTC"),
                    window.end.format("%H:%M UTC")
                ));
            }
        }
        for warning in &result.warnings {
            print_warning(&format!("{}: {}", result.instance.name, warning));
        }
    }

    for failure in &analysis.failures {
        print_error(&format!("{}: {}", failure.instance, failure.error));
    }

    println!(
        "\nAnalyzed {} of {} instances, {} need scaling (estimated savings {})",
        analysis.analyzed_instances,
        analysis.total_instances,
        analysis.scalable().len(),
        format_savings(analysis.total_estimated_savings())
    );
}

fn print_applied(applied: &[AppliedChange], errors: &[InstanceFailure]) {
    for change in applied {
        match &change.outcome {
            ApplyOutcome::Applied => print_success(&format!(
                "{} resized to {}",
                change.instance, change.target_tier
            )),
            ApplyOutcome::DryRun => print_info(&format!(
                "{} would be resized to {}",
                change.instance, change.target_tier
            )),
            ApplyOutcome::Rejected { reason } => {
                print_warning(&format!("{} skipped: {}", change.instance, reason))
            }
        }
    }
    for error in errors {
        print_error(&format!("{}: {}", error.instance, error.error));
    }
}
