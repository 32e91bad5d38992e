//! Prediction output formatting
//!
//! Converts a success probability into a `RiskResult`: risk inversion,
//! category thresholds, confidence and the degraded-mode ceiling.

use crate::models::{GradeBand, PredictionSource, RiskCategory, RiskResult};

/// Confidence ceiling for heuristic (degraded) predictions
pub const DEGRADED_CONFIDENCE_CEILING: f64 = 0.4;

/// Confidence multiplier for a record with no observed features
pub const MIN_COVERAGE_WEIGHT: f64 = 0.5;

/// Configuration for output formatting
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Upper bound on confidence for fallback predictions
    pub degraded_confidence_ceiling: f64,
    /// Confidence multiplier applied at zero data coverage
    pub min_coverage_weight: f64,
    /// Below this a result is flagged as low confidence
    pub low_confidence_threshold: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            degraded_confidence_ceiling: DEGRADED_CONFIDENCE_CEILING,
            min_coverage_weight: MIN_COVERAGE_WEIGHT,
            low_confidence_threshold: 0.4,
        }
    }
}

/// Formats raw success probabilities into risk results
#[derive(Debug, Clone)]
pub struct RiskFormatter {
    config: OutputConfig,
}

impl RiskFormatter {
    pub fn new() -> Self {
        Self {
            config: OutputConfig::default(),
        }
    }

    pub fn with_config(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Distance from maximum uncertainty, normalised to [0,1].
    ///
    /// Symmetric around 0.5: `confidence(p) == confidence(1 - p)`.
    pub fn base_confidence(success_probability: f64) -> f64 {
        (2.0 * (success_probability - 0.5).abs()).clamp(0.0, 1.0)
    }

    /// Build a result from the classifier's success probability.
    ///
    /// The model predicts success; risk is its complement. Getting this
    /// backwards inverts every triage decision downstream.
    pub fn format(
        &self,
        student_id: &str,
        success_probability: f64,
        data_coverage: f64,
        model_version: &str,
        grade_band: Option<GradeBand>,
        source: PredictionSource,
    ) -> RiskResult {
        let success_probability = success_probability.clamp(0.0, 1.0);
        let risk_probability = 1.0 - success_probability;
        let data_coverage = if data_coverage.is_finite() {
            data_coverage.clamp(0.0, 1.0)
        } else {
            0.0
        };

        RiskResult {
            student_id: student_id.to_string(),
            success_probability,
            risk_probability,
            risk_category: RiskCategory::from_risk_probability(risk_probability),
            confidence: self.calculate_confidence(success_probability, data_coverage, source),
            data_coverage,
            model_version: model_version.to_string(),
            grade_band,
            source,
            generated_at: chrono::Utc::now().timestamp(),
        }
    }

    fn calculate_confidence(&self, success_probability: f64, data_coverage: f64, source: PredictionSource) -> f64 {
        let floor = self.config.min_coverage_weight.clamp(0.0, 1.0);
        let coverage_weight = floor + (1.0 - floor) * data_coverage;
        let confidence = Self::base_confidence(success_probability) * coverage_weight;

        if source.is_fallback() {
            confidence.min(self.config.degraded_confidence_ceiling)
        } else {
            confidence
        }
    }

    /// Fallback results are always low confidence, whatever their score
    pub fn is_low_confidence(&self, result: &RiskResult) -> bool {
        result.source.is_fallback() || result.confidence < self.config.low_confidence_threshold
    }

    /// Get the reason for low confidence (if applicable)
    pub fn low_confidence_reason(&self, result: &RiskResult) -> Option<String> {
        if !self.is_low_confidence(result) {
            None
        } else if result.source.is_fallback() {
            Some("Served by the fallback heuristic; the trained model was not used".to_string())
        } else if result.data_coverage < 0.5 {
            Some("Most model inputs were missing and filled with defaults".to_string())
        } else {
            Some("Prediction is close to the decision boundary".to_string())
        }
    }
}

impl Default for RiskFormatter {
    fn default() -> Self {
        Self::new()
    }
}
