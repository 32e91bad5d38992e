//! Inference backends
//!
//! `OnnxClassifier` runs exported classifiers through tract-onnx,
//! `LogisticClassifier` evaluates a natively serialised standardised
//! logistic regression, and `FallbackPredictor` is the fixed-weight
//! heuristic used when no model can serve a vector.

use super::Classifier;
use crate::models::FeatureVector;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Maximum inference latency before warning
const MAX_INFERENCE_MS: u128 = 5;

/// Model version reported for heuristic predictions
pub const FALLBACK_MODEL_VERSION: &str = "heuristic-fallback";

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based classifier using tract for lightweight inference
pub struct OnnxClassifier {
    model: TractModel,
    num_features: usize,
}

impl OnnxClassifier {
    /// Parse and optimise an ONNX classifier taking `num_features` inputs
    pub fn from_bytes(model_bytes: &[u8], num_features: usize) -> Result<Self> {
        let model = Self::load_model(model_bytes, num_features)?;
        Ok(Self {
            model,
            num_features,
        })
    }

    fn load_model(model_bytes: &[u8], num_features: usize) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, num_features]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    fn features_to_tensor(&self, features: &[f32]) -> Result<Tensor> {
        if features.len() != self.num_features {
            anyhow::bail!(
                "Input has {} features, model expects {}",
                features.len(),
                self.num_features
            );
        }
        let array = tract_ndarray::Array2::from_shape_vec((1, self.num_features), features.to_vec())
            .context("Failed to shape input tensor")?;
        Ok(array.into())
    }

    /// Read the positive-class probability from the model output.
    ///
    /// Accepts either a single probability or a `[p_negative, p_positive]` pair.
    fn output_probability(output: &Tensor) -> Result<f64> {
        let view = output.to_array_view::<f32>()?;
        let values: Vec<f32> = view.iter().copied().collect();
        match values.as_slice() {
            [p] => Ok(*p as f64),
            [_, p] => Ok(*p as f64),
            other => anyhow::bail!("Model output has {} values, expected 1 or 2", other.len()),
        }
    }
}

impl Classifier for OnnxClassifier {
    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        let start = Instant::now();
        let input = self.features_to_tensor(features)?;

        let result = self.model.run(tvec!(input.into()))?;
        // Classifier exports put probabilities last (after the label output)
        let output = result.last().context("No output from model")?;
        let probability = Self::output_probability(output)?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(probability)
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}

/// Standardised logistic regression: `sigmoid(b + Σ wᵢ·(xᵢ − μᵢ)/σᵢ)`
#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    intercept: f64,
    coefficients: Vec<f64>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl LogisticClassifier {
    /// Empty `means`/`scales` mean an unstandardised model (μ = 0, σ = 1)
    pub fn new(intercept: f64, coefficients: Vec<f64>, means: Vec<f64>, scales: Vec<f64>) -> Result<Self> {
        let n = coefficients.len();
        let means = if means.is_empty() { vec![0.0; n] } else { means };
        let scales = if scales.is_empty() { vec![1.0; n] } else { scales };

        if means.len() != n || scales.len() != n {
            anyhow::bail!(
                "Logistic parameters disagree: {} coefficients, {} means, {} scales",
                n,
                means.len(),
                scales.len()
            );
        }
        if !intercept.is_finite()
            || coefficients.iter().chain(&means).any(|v| !v.is_finite())
            || scales.iter().any(|s| !s.is_finite() || *s <= 0.0)
        {
            anyhow::bail!("Logistic parameters must be finite with positive scales");
        }

        Ok(Self {
            intercept,
            coefficients,
            means,
            scales,
        })
    }

    pub fn num_features(&self) -> usize {
        self.coefficients.len()
    }
}

impl Classifier for LogisticClassifier {
    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            anyhow::bail!(
                "Input has {} features, model expects {}",
                features.len(),
                self.coefficients.len()
            );
        }
        let logit = self.intercept
            + features
                .iter()
                .zip(&self.coefficients)
                .zip(self.means.iter().zip(&self.scales))
                .map(|((x, w), (mu, sigma))| w * (*x as f64 - mu) / sigma)
                .sum::<f64>();
        Ok(sigmoid(logit))
    }

    fn backend(&self) -> &'static str {
        "logistic"
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Core features the heuristic reads: (name, default, center, weight, min, max)
const CORE_FEATURES: [(&str, f64, f64, f64, f64, f64); 3] = [
    ("gpa", 2.8, 2.5, 1.5, 0.0, 4.0),
    ("attendance_rate", 0.92, 0.9, 8.0, 0.0, 1.0),
    ("course_failures", 0.0, 0.0, -0.8, 0.0, 10.0),
];

const FALLBACK_INTERCEPT: f64 = 0.6;

/// Fixed-weight heuristic used when the model is unavailable or cannot
/// serve a vector
pub struct FallbackPredictor;

impl FallbackPredictor {
    /// Feature schema the heuristic reads
    pub fn schema() -> Arc<[String]> {
        CORE_FEATURES
            .iter()
            .map(|(name, ..)| name.to_string())
            .collect::<Vec<_>>()
            .into()
    }

    /// Success probability from GPA, attendance and course failures.
    ///
    /// Features are looked up by name, so vectors built for any schema work;
    /// absent or non-finite entries use the heuristic's defaults.
    pub fn success_probability(features: &FeatureVector) -> f64 {
        let logit = FALLBACK_INTERCEPT
            + CORE_FEATURES
                .iter()
                .map(|(name, default, center, weight, min, max)| {
                    let value = features
                        .get(name)
                        .map(f64::from)
                        .filter(|v| v.is_finite())
                        .unwrap_or(*default)
                        .clamp(*min, *max);
                    weight * (value - center)
                })
                .sum::<f64>();
        sigmoid(logit)
    }

    /// Share of the heuristic's inputs that were observed in the record
    pub fn coverage(features: &FeatureVector) -> f64 {
        let observed = CORE_FEATURES
            .iter()
            .filter(|(name, ..)| features.is_observed(name))
            .count();
        observed as f64 / CORE_FEATURES.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(names: &[&str], values: Vec<f32>) -> FeatureVector {
        let names: Arc<[String]> = names.iter().map(|s| s.to_string()).collect::<Vec<_>>().into();
        FeatureVector::from_values("s-1", names, values)
    }

    #[test]
    fn test_logistic_standardisation() {
        let model = LogisticClassifier::new(0.0, vec![1.0, -2.0], vec![2.0, 1.0], vec![0.5, 2.0]).unwrap();
        // at the means the logit is the intercept
        assert!((model.predict_proba(&[2.0, 1.0]).unwrap() - 0.5).abs() < 1e-12);
        // (3 - 2)/0.5 * 1 = 2
        assert!((model.predict_proba(&[3.0, 1.0]).unwrap() - sigmoid(2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_logistic_rejects_wrong_width() {
        let model = LogisticClassifier::new(0.1, vec![1.0, 1.0], vec![], vec![]).unwrap();
        assert!(model.predict_proba(&[1.0]).is_err());
        assert_eq!(model.num_features(), 2);
        assert_eq!(model.backend(), "logistic");
    }

    #[test]
    fn test_logistic_rejects_bad_parameters() {
        assert!(LogisticClassifier::new(0.0, vec![1.0], vec![0.0, 1.0], vec![]).is_err());
        assert!(LogisticClassifier::new(0.0, vec![1.0], vec![], vec![0.0]).is_err());
        assert!(LogisticClassifier::new(f64::NAN, vec![1.0], vec![], vec![]).is_err());
    }

    #[test]
    fn test_onnx_rejects_garbage_bytes() {
        assert!(OnnxClassifier::from_bytes(b"definitely not protobuf", 8).is_err());
    }

    #[test]
    fn test_fallback_orders_students_sensibly() {
        let strong = vector(&["gpa", "attendance_rate", "course_failures"], vec![3.8, 0.98, 0.0]);
        let weak = vector(&["gpa", "attendance_rate", "course_failures"], vec![1.6, 0.7, 3.0]);
        let strong_p = FallbackPredictor::success_probability(&strong);
        let weak_p = FallbackPredictor::success_probability(&weak);
        assert!(strong_p > 0.9, "strong student p={}", strong_p);
        assert!(weak_p < 0.1, "weak student p={}", weak_p);
    }

    #[test]
    fn test_fallback_reads_any_schema_by_name() {
        let reordered = vector(&["course_failures", "discipline_incidents", "gpa"], vec![0.0, 2.0, 3.0]);
        let p = FallbackPredictor::success_probability(&reordered);
        assert!(p > 0.0 && p < 1.0);
        assert!((FallbackPredictor::coverage(&reordered) - 2.0 / 3.0).abs() < 1e-12);

        let empty = vector(&[], vec![]);
        assert_eq!(FallbackPredictor::coverage(&empty), 0.0);
        assert!(FallbackPredictor::success_probability(&empty).is_finite());
    }

    #[test]
    fn test_fallback_schema() {
        let schema = FallbackPredictor::schema();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema[0], "gpa");
    }
}
