//! Scorer configuration

use anyhow::{Context, Result};
use scorer_lib::{ExplainConfig, GradeBand, PipelineConfig, PredictorConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// Scorer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics/scoring
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding one artifact or one sub-directory per grade band
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Band whose model serves records without a matching band
    #[serde(default = "default_band")]
    pub default_band: String,

    /// Risk and protective factors reported per explanation
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Largest batch accepted by `/v1/predict/batch`
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "risk-scorer".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_band() -> String {
    "high".to_string()
}

fn default_top_n() -> usize {
    5
}

fn default_max_batch_size() -> usize {
    1000
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            model_dir: default_model_dir(),
            default_band: default_band(),
            top_n: default_top_n(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl ScorerConfig {
    /// Load configuration from `SCORER_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SCORER").try_parsing(true))
            .build()?;

        config
            .try_deserialize()
            .context("Invalid SCORER_* configuration")
    }

    /// Core pipeline settings derived from this configuration
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let default_band = match self.default_band.trim() {
            "" | "none" => None,
            label => Some(
                GradeBand::parse(label)
                    .with_context(|| format!("Unknown grade band {:?}", label))?,
            ),
        };

        Ok(PipelineConfig {
            predictor: PredictorConfig {
                default_band,
                instance_name: self.instance_name.clone(),
                ..PredictorConfig::default()
            },
            explain: ExplainConfig {
                top_n: self.top_n,
                ..ExplainConfig::default()
            },
        })
    }
}
