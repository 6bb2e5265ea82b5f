//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use scaler_lib::models::ScaleDirection;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a rounded table, or a notice when there are no rows
pub fn print_table<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a monthly USD amount; negative amounts are extra cost
pub fn format_savings(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", -amount).red().to_string()
    } else if amount > 0.0 {
        format!("${:.2}", amount).green().to_string()
    } else {
        "$0.00".to_string()
    }
}

/// Color utilization: red above 80%, yellow above 50%
pub fn color_utilization(percent: f64) -> String {
    let formatted = format!("{:.1}%", percent);
    if percent > 80.0 {
        formatted.red().to_string()
    } else if percent > 50.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

pub fn format_direction(direction: Option<ScaleDirection>) -> String {
    match direction {
        Some(ScaleDirection::Up) => "▲ up".red().to_string(),
        Some(ScaleDirection::Down) => "▼ down".green().to_string(),
        None => "hold".dimmed().to_string(),
    }
}

pub fn format_bool(value: bool) -> String {
    if value {
        "yes".yellow().to_string()
    } else {
        "no".to_string()
    }
}
