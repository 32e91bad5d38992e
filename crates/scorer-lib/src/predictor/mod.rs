//! Risk prediction engine
//!
//! Loads model artifacts once, scores feature vectors against them and
//! falls back to a fixed-weight heuristic whenever the model cannot serve
//! a vector.

mod artifact;
mod engine;
mod inference;
mod output;

#[cfg(test)]
pub(crate) mod test_support;

pub use artifact::{
    compute_checksum, importances_are_valid, ModelArtifact, ModelMetadata, OutputSemantics,
    MANIFEST_FILE,
};
pub use engine::{LoadOutcome, PredictorConfig, PredictorState, RiskPredictor};
pub use inference::{
    FallbackPredictor, LogisticClassifier, OnnxClassifier, FALLBACK_MODEL_VERSION,
};
pub use output::{
    OutputConfig, RiskFormatter, DEGRADED_CONFIDENCE_CEILING, MIN_COVERAGE_WEIGHT,
};

use anyhow::Result;

/// A trained binary classifier behind any inference backend
pub trait Classifier: Send + Sync {
    /// Probability of the positive class for one feature row
    fn predict_proba(&self, features: &[f32]) -> Result<f64>;

    /// Short backend name for metadata and metrics
    fn backend(&self) -> &'static str;
}
