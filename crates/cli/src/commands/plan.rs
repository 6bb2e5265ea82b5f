//! Priority-ordered scaling plan

use anyhow::Result;
use scaler_lib::analyzer::Analyzer;
use scaler_lib::shutdown::ShutdownSignal;
use tabled::Tabled;

use crate::output::{
    format_bool, format_direction, format_savings, print_error, print_json, print_table,
    OutputFormat,
};

/// Row for the plan table
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Priority")]
    priority: u32,
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Downtime")]
    downtime: String,
    #[tabled(rename = "Savings/mo")]
    savings: String,
}

/// Print the plan. Returns false if any instance failed to analyze.
pub async fn run(analyzer: &Analyzer, shutdown: &ShutdownSignal, format: OutputFormat) -> Result<bool> {
    let analysis = analyzer.analyze_all(shutdown).await?;
    let plan = analysis.scaling_plan();

    match format {
        OutputFormat::Json => print_json(&plan)?,
        OutputFormat::Table => {
            let rows: Vec<PlanRow> = plan
                .operations
                .iter()
                .enumerate()
                .map(|(i, op)| PlanRow {
                    position: i + 1,
                    priority: op.priority,
                    instance: op.instance.clone(),
                    from: op.current_tier.clone(),
                    to: op.target_tier.clone(),
                    direction: format_direction(op.direction),
                    downtime: format_bool(op.downtime_expected),
                    savings: format_savings(op.estimated_monthly_savings),
                })
                .collect();
            print_table(rows, "No scaling needed");

            for failure in &analysis.failures {
                print_error(&format!("{}: {}", failure.instance, failure.error));
            }
            if !plan.is_empty() {
                println!(
                    "\n{} operations, estimated savings {}",
                    plan.operations.len(),
                    format_savings(plan.total_estimated_savings())
                );
            }
        }
    }

    Ok(analysis.failures.is_empty())
}
