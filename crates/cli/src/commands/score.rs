//! Batch scoring

use super::Context;
use crate::input::read_records;
use crate::output::{color_category, color_confidence, format_percent, format_source, print_warning, OutputFormat};
use anyhow::Result;
use clap::ValueEnum;
use scorer_lib::{RiskCategory, RiskResult};
use std::path::Path;
use tabled::Tabled;

/// Minimum risk category to display
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CategoryFilter {
    Low,
    Moderate,
    High,
}

impl From<CategoryFilter> for RiskCategory {
    fn from(filter: CategoryFilter) -> Self {
        match filter {
            CategoryFilter::Low => RiskCategory::Low,
            CategoryFilter::Moderate => RiskCategory::Moderate,
            CategoryFilter::High => RiskCategory::High,
        }
    }
}

/// Row for the scores table
#[derive(Tabled)]
struct ScoreRow {
    #[tabled(rename = "Student")]
    student_id: String,
    #[tabled(rename = "Risk")]
    risk: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Coverage")]
    coverage: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Model")]
    model: String,
}

impl From<&RiskResult> for ScoreRow {
    fn from(r: &RiskResult) -> Self {
        Self {
            student_id: r.student_id.clone(),
            risk: format_percent(r.risk_probability),
            category: color_category(r.risk_category),
            confidence: color_confidence(r.confidence),
            coverage: format_percent(r.data_coverage),
            source: format_source(&r.source),
            model: r.model_version.clone(),
        }
    }
}

/// Score every record, optionally hiding results below a category
pub fn score(
    ctx: &Context,
    input: &Path,
    min_category: Option<CategoryFilter>,
    band: Option<&str>,
) -> Result<()> {
    let pipeline = ctx.pipeline(band, scorer_lib::explain::DEFAULT_TOP_N)?;
    let loaded = read_records(input)?;
    ctx.report_rejected(&loaded);

    let results = pipeline.predict_many(&loaded.records);
    let threshold = min_category.map(RiskCategory::from).unwrap_or(RiskCategory::Low);
    let shown: Vec<&RiskResult> = results
        .iter()
        .filter(|r| r.risk_category >= threshold)
        .collect();

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&shown)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if shown.is_empty() {
                print_warning("No students matched");
                return Ok(());
            }

            let rows: Vec<ScoreRow> = shown.iter().copied().map(ScoreRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            let count = |c: RiskCategory| results.iter().filter(|r| r.risk_category == c).count();
            println!(
                "\nTotal: {} students ({} high, {} moderate, {} low)",
                results.len(),
                count(RiskCategory::High),
                count(RiskCategory::Moderate),
                count(RiskCategory::Low)
            );
        }
    }

    Ok(())
}
