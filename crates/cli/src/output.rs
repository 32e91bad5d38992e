//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use scorer_lib::{PredictionSource, RiskCategory};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a probability as percentage
pub fn format_percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

/// Color a risk category by severity
pub fn color_category(category: RiskCategory) -> String {
    let label = category.as_str();
    match category {
        RiskCategory::High => label.red().bold().to_string(),
        RiskCategory::Moderate => label.yellow().to_string(),
        RiskCategory::Low => label.green().to_string(),
    }
}

/// Color confidence based on value
pub fn color_confidence(confidence: f64) -> String {
    let formatted = format_percent(confidence);
    if confidence >= 0.7 {
        formatted.green().to_string()
    } else if confidence >= 0.4 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Short label for where a result came from
pub fn format_source(source: &PredictionSource) -> String {
    match source {
        PredictionSource::Model => "model".to_string(),
        PredictionSource::Fallback { reason } => format!("fallback ({})", reason.as_str()).yellow().to_string(),
    }
}

/// Color predictor state
pub fn color_state(state: &str) -> String {
    match state {
        "ready" => state.green().to_string(),
        "degraded" => state.yellow().to_string(),
        _ => state.red().to_string(),
    }
}
