//! Explanations and intervention suggestions

use super::Context;
use crate::input::read_records;
use crate::output::{color_category, color_confidence, format_percent, print_warning, OutputFormat};
use anyhow::Result;
use colored::Colorize;
use scorer_lib::explain::FactorSeverity;
use scorer_lib::Assessment;
use std::path::Path;
use tabled::Tabled;

/// Row for the factors table
#[derive(Tabled)]
struct FactorRow {
    #[tabled(rename = "Factor")]
    label: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Effect")]
    effect: String,
    #[tabled(rename = "Severity")]
    severity: String,
}

fn color_severity(severity: FactorSeverity) -> String {
    match severity {
        FactorSeverity::High => severity.as_str().red().to_string(),
        FactorSeverity::Moderate => severity.as_str().yellow().to_string(),
        FactorSeverity::Low => severity.as_str().to_string(),
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn factor_rows(assessment: &Assessment) -> Vec<FactorRow> {
    let explanation = &assessment.explanation;
    let risk = explanation.risk_factors.iter().map(|f| FactorRow {
        label: f.label.clone(),
        value: format_value(f.value),
        effect: "risk".red().to_string(),
        severity: color_severity(f.severity),
    });
    let protective = explanation.protective_factors.iter().map(|f| FactorRow {
        label: f.label.clone(),
        value: format_value(f.value),
        effect: "protective".green().to_string(),
        severity: "-".to_string(),
    });
    risk.chain(protective).collect()
}

fn print_assessment(assessment: &Assessment, verbose: bool) {
    let result = &assessment.result;
    println!(
        "{}  risk {}  {}  confidence {}",
        result.student_id.bold(),
        format_percent(result.risk_probability),
        color_category(result.risk_category),
        color_confidence(result.confidence)
    );

    let rows = factor_rows(assessment);
    if rows.is_empty() {
        println!("  No factors stand out from typical values");
    } else {
        let table = tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string();
        println!("{}", table);
    }

    println!("  {}", assessment.explanation.confidence_statement);
    if let Some(caveat) = &assessment.explanation.caveat {
        println!("  {}", caveat.yellow());
    }
    let interventions: Vec<&str> = assessment.interventions.iter().map(|i| i.as_str()).collect();
    println!("  Suggested: {}", interventions.join(", "));

    if verbose && !assessment.defaulted.is_empty() {
        let fields: Vec<String> = assessment
            .defaulted
            .iter()
            .map(|d| format!("{} ({})", d.feature, d.reason.as_str()))
            .collect();
        println!("  Defaulted: {}", fields.join(", ").dimmed());
    }
    println!();
}

/// Explain every record, or only `student`
pub fn explain(
    ctx: &Context,
    input: &Path,
    student: Option<&str>,
    top_n: usize,
    band: Option<&str>,
) -> Result<()> {
    let pipeline = ctx.pipeline(band, top_n)?;
    let loaded = read_records(input)?;
    ctx.report_rejected(&loaded);

    let assessments: Vec<Assessment> = loaded
        .records
        .iter()
        .filter(|r| student.map(|id| r.student_id() == id).unwrap_or(true))
        .map(|r| pipeline.assess(r))
        .collect();

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&assessments)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if assessments.is_empty() {
                print_warning("No students matched");
                return Ok(());
            }
            for assessment in &assessments {
                print_assessment(assessment, ctx.verbose);
            }
        }
    }

    Ok(())
}
