//! CLI commands

pub mod explain;
pub mod model;
pub mod score;

use crate::input::LoadedRecords;
use crate::output::{print_info, print_warning, OutputFormat};
use anyhow::{Context as _, Result};
use scorer_lib::{
    EarlyWarningPipeline, ExplainConfig, GradeBand, PipelineConfig, PredictorConfig,
};
use std::path::PathBuf;

/// Settings shared by every command
pub struct Context {
    pub model_dir: PathBuf,
    pub format: OutputFormat,
    pub verbose: bool,
}

impl Context {
    /// Load the model directory into a pipeline, reporting load problems
    pub fn pipeline(&self, band: Option<&str>, top_n: usize) -> Result<EarlyWarningPipeline> {
        let mut predictor = PredictorConfig {
            instance_name: "ews-cli".to_string(),
            ..PredictorConfig::default()
        };
        if let Some(label) = band {
            predictor.default_band =
                Some(GradeBand::parse(label).with_context(|| format!("Unknown grade band {:?}", label))?);
        }

        let config = PipelineConfig {
            predictor,
            explain: ExplainConfig {
                top_n,
                ..ExplainConfig::default()
            },
        };
        let (pipeline, errors) = EarlyWarningPipeline::load(&self.model_dir, config);

        if self.verbose {
            for error in &errors {
                print_warning(&error.to_string());
            }
        }
        if pipeline.predictor().is_degraded() {
            print_warning(&format!(
                "No model could be loaded from {}; using the fallback heuristic",
                self.model_dir.display()
            ));
        } else if self.verbose && matches!(self.format, OutputFormat::Table) {
            print_info(&format!(
                "Loaded {}",
                pipeline.predictor().model_versions().join(", ")
            ));
        }

        Ok(pipeline)
    }

    /// Report skipped input rows
    pub fn report_rejected(&self, loaded: &LoadedRecords) {
        if loaded.rejected.is_empty() {
            return;
        }
        print_warning(&format!("Skipped {} unreadable rows", loaded.rejected.len()));
        if self.verbose {
            for row in &loaded.rejected {
                print_warning(&row.to_string());
            }
        }
    }
}
