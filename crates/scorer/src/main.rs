//! Risk Scorer - early-warning risk prediction service
//!
//! Loads model artifacts once at startup and serves predictions and
//! explanations from a single shared pipeline.

use anyhow::{Context, Result};
use risk_scorer::{api, config};
use scorer_lib::{
    health::HealthRegistry,
    observability::{ScorerMetrics, StructuredLogger},
    EarlyWarningPipeline,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SCORER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting risk-scorer");

    let config = config::ScorerConfig::load()?;
    let pipeline_config = config.pipeline_config()?;
    info!(
        instance = %config.instance_name,
        model_dir = %config.model_dir.display(),
        "Scorer configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.report_loading(&config.model_dir).await;

    let metrics = ScorerMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    // Artifact loading is blocking file I/O; finish it before taking traffic
    let model_dir = config.model_dir.clone();
    let (pipeline, errors) = tokio::task::spawn_blocking(move || {
        EarlyWarningPipeline::load(&model_dir, pipeline_config)
    })
    .await
    .context("Model loading task panicked")?;

    for error in &errors {
        warn!(error = %error, "Model artifact failed to load");
    }

    health_registry.report_predictor(pipeline.predictor()).await;
    logger.log_startup(
        SCORER_VERSION,
        pipeline.predictor().state(),
        &pipeline.predictor().model_versions(),
    );

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        Arc::new(pipeline),
        config.max_batch_size,
    ));

    health_registry.set_ready(true).await;

    tokio::select! {
        result = api::serve(config.api_port, app_state) => {
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            info!("Shutting down");
        }
    }

    Ok(())
}
