//! Observability infrastructure for the risk scorer
//!
//! Provides:
//! - Prometheus metrics (prediction latency, outcomes, fallbacks, defaulted inputs, model info)
//! - Structured JSON logging with tracing

use crate::models::{FallbackReason, RiskResult};
use crate::predictor::PredictorState;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter_vec, register_int_gauge, GaugeVec,
    Histogram, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for per-record prediction latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScorerMetricsInner> = OnceLock::new();

struct ScorerMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    fallback_predictions_total: IntCounterVec,
    defaulted_features_total: IntCounterVec,
    model_info: GaugeVec,
    predictor_state: IntGauge,
}

impl ScorerMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "risk_scorer_prediction_latency_seconds",
                "Time spent turning one feature vector into a risk result",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "risk_scorer_predictions_total",
                "Risk results returned, by category and source",
                &["risk_category", "source"]
            )
            .expect("Failed to register predictions_total"),

            fallback_predictions_total: register_int_counter_vec!(
                "risk_scorer_fallback_predictions_total",
                "Predictions served by the heuristic, by reason",
                &["reason"]
            )
            .expect("Failed to register fallback_predictions_total"),

            defaulted_features_total: register_int_counter_vec!(
                "risk_scorer_defaulted_features_total",
                "Feature values replaced by catalog defaults, by reason",
                &["reason"]
            )
            .expect("Failed to register defaulted_features_total"),

            model_info: register_gauge_vec!(
                "risk_scorer_model_info",
                "Loaded model artifacts",
                &["version", "grade_band", "backend"]
            )
            .expect("Failed to register model_info"),

            predictor_state: register_int_gauge!(
                "risk_scorer_predictor_state",
                "Predictor state: 0 uninitialized, 1 loading, 2 ready, 3 degraded"
            )
            .expect("Failed to register predictor_state"),
        }
    }
}

/// Scorer metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ScorerMetrics {
    _private: (),
}

impl Default for ScorerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScorerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScorerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScorerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScorerMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Count a returned result under its category and source
    pub fn record_result(&self, result: &RiskResult) {
        self.inner()
            .predictions_total
            .with_label_values(&[result.risk_category.as_str(), result.source.label()])
            .inc();
    }

    pub fn inc_fallback(&self, reason: FallbackReason) {
        self.inner()
            .fallback_predictions_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    pub fn inc_defaulted_features(&self, reason: &str, count: u64) {
        if count > 0 {
            self.inner()
                .defaulted_features_total
                .with_label_values(&[reason])
                .inc_by(count);
        }
    }

    /// Mark an artifact as loaded
    pub fn set_model_info(&self, version: &str, grade_band: &str, backend: &str) {
        self.inner()
            .model_info
            .with_label_values(&[version, grade_band, backend])
            .set(1.0);
    }

    pub fn set_predictor_state(&self, state: PredictorState) {
        self.inner().predictor_state.set(state.as_gauge());
    }
}

/// Structured logger for scorer events
///
/// Provides consistent JSON-formatted logging for predictions,
/// model loading, and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log a prediction generation event
    pub fn log_prediction(&self, result: &RiskResult) {
        info!(
            event = "prediction_generated",
            instance = %self.instance,
            student_id = %result.student_id,
            risk_probability = result.risk_probability,
            risk_category = %result.risk_category,
            confidence = result.confidence,
            data_coverage = result.data_coverage,
            model_version = %result.model_version,
            source = result.source.label(),
            "Generated risk prediction"
        );
    }

    /// Log a prediction served by the heuristic
    pub fn log_fallback(&self, student_id: &str, reason: FallbackReason, detail: &str) {
        warn!(
            event = "prediction_fallback",
            instance = %self.instance,
            student_id = %student_id,
            reason = reason.as_str(),
            detail = %detail,
            "Prediction served by fallback heuristic"
        );
    }

    /// Log input fields replaced by defaults
    pub fn log_defaulted_fields(&self, student_id: &str, fields: &[String]) {
        if fields.is_empty() {
            return;
        }
        info!(
            event = "fields_defaulted",
            instance = %self.instance,
            student_id = %student_id,
            count = fields.len(),
            fields = ?fields,
            "Input fields replaced by defaults"
        );
    }

    /// Log a successfully loaded artifact
    pub fn log_model_loaded(&self, model_version: &str, grade_band: &str, backend: &str, features: usize) {
        info!(
            event = "model_loaded",
            instance = %self.instance,
            model_version = %model_version,
            grade_band = %grade_band,
            backend = %backend,
            features = features,
            "Model artifact loaded"
        );
    }

    /// Log the startup load failure that puts the predictor in degraded mode
    pub fn log_model_load_failed(&self, model_dir: &str, reason: &str) {
        error!(
            event = "model_load_failed",
            instance = %self.instance,
            model_dir = %model_dir,
            reason = %reason,
            "No model artifact could be loaded, serving heuristic predictions"
        );
    }

    /// Log scorer startup
    pub fn log_startup(&self, version: &str, state: PredictorState, model_versions: &[String]) {
        info!(
            event = "scorer_started",
            instance = %self.instance,
            scorer_version = %version,
            predictor_state = %state,
            model_versions = ?model_versions,
            "Risk scorer started"
        );
    }

    /// Log scorer shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scorer_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Risk scorer shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PredictionSource, RiskCategory};

    #[test]
    fn test_scorer_metrics_creation() {
        let metrics = ScorerMetrics::new();
        let result = RiskResult {
            student_id: "s-1".into(),
            success_probability: 0.8,
            risk_probability: 0.2,
            risk_category: RiskCategory::Low,
            confidence: 0.6,
            data_coverage: 1.0,
            model_version: "v1".into(),
            grade_band: None,
            source: PredictionSource::Model,
            generated_at: 0,
        };

        metrics.observe_prediction_latency(0.0002);
        metrics.record_result(&result);
        metrics.inc_fallback(FallbackReason::SchemaMismatch);
        metrics.inc_defaulted_features("missing", 3);
        metrics.inc_defaulted_features("invalid", 0);
        metrics.set_model_info("v1", "high", "logistic");
        metrics.set_predictor_state(PredictorState::Ready);

        let families = prometheus::gather();
        assert!(families.iter().any(|f| f.get_name() == "risk_scorer_predictions_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-scorer");
        assert_eq!(logger.instance(), "test-scorer");
        logger.log_defaulted_fields("s-1", &[]);
    }
}
