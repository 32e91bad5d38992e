//! Model directory inspection

use super::Context;
use crate::output::{color_state, print_warning, OutputFormat};
use anyhow::Result;
use scorer_lib::explain::DEFAULT_TOP_N;
use serde_json::json;
use tabled::Tabled;

/// Row for models table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Band")]
    band: String,
    #[tabled(rename = "Backend")]
    backend: String,
    #[tabled(rename = "Features")]
    features: usize,
    #[tabled(rename = "AUC")]
    auc: String,
    #[tabled(rename = "Trained")]
    trained_at: String,
}

/// Row for the feature importance table
#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    name: String,
    #[tabled(rename = "Importance")]
    importance: String,
}

/// Show predictor state and the loaded artifacts
pub fn show_models(ctx: &Context) -> Result<()> {
    let pipeline = ctx.pipeline(None, DEFAULT_TOP_N)?;
    let predictor = pipeline.predictor();

    match ctx.format {
        OutputFormat::Json => {
            let models: Vec<_> = predictor
                .artifacts()
                .iter()
                .map(|a| {
                    json!({
                        "metadata": a.metadata(),
                        "features": a.feature_names().as_ref(),
                        "feature_importances": a.feature_importances(),
                    })
                })
                .collect();
            let report = json!({
                "model_dir": ctx.model_dir.display().to_string(),
                "state": predictor.state().as_str(),
                "degraded_reason": predictor.degraded_reason(),
                "models": models,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            println!(
                "Model directory: {}  state: {}",
                ctx.model_dir.display(),
                color_state(predictor.state().as_str())
            );
            if predictor.artifacts().is_empty() {
                print_warning("No models loaded");
                return Ok(());
            }

            let rows: Vec<ModelRow> = predictor
                .artifacts()
                .iter()
                .map(|a| {
                    let meta = a.metadata();
                    ModelRow {
                        version: meta.model_version.clone(),
                        band: meta.grade_band.map(|b| b.to_string()).unwrap_or_else(|| "-".into()),
                        backend: meta.backend.to_string(),
                        features: a.feature_names().len(),
                        auc: meta.auc_score.map(|s| format!("{:.2}", s)).unwrap_or_else(|| "-".into()),
                        trained_at: meta
                            .trained_at
                            .map(|t| t.format("%Y-%m-%d").to_string())
                            .unwrap_or_else(|| "-".into()),
                    }
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            if ctx.verbose {
                for artifact in predictor.artifacts() {
                    println!("\n{}", artifact.model_version());
                    let rows: Vec<FeatureRow> = artifact
                        .feature_names()
                        .iter()
                        .enumerate()
                        .map(|(i, name)| FeatureRow {
                            name: name.clone(),
                            importance: artifact
                                .feature_importances()
                                .get(i)
                                .map(|w| format!("{:.3}", w))
                                .unwrap_or_else(|| "-".into()),
                        })
                        .collect();
                    let table = tabled::Table::new(rows)
                        .with(tabled::settings::Style::rounded())
                        .to_string();
                    println!("{}", table);
                }
            }
        }
    }

    Ok(())
}
