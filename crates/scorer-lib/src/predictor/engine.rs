//! Risk predictor
//!
//! Owns the loaded artifacts for the lifetime of the process. The state
//! machine is `Uninitialized → Loading → Ready | Degraded`; both end states
//! are terminal. In `Degraded` every vector is scored by the heuristic.

use super::artifact::ModelArtifact;
use super::inference::{FallbackPredictor, FALLBACK_MODEL_VERSION};
use super::output::{OutputConfig, RiskFormatter};
use crate::error::{ArtifactError, PredictionError};
use crate::features::FeatureCatalog;
use crate::models::{FallbackReason, FeatureVector, GradeBand, PredictionSource, RiskResult};
use crate::observability::{ScorerMetrics, StructuredLogger};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Lifecycle state of the predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorState {
    Uninitialized,
    Loading,
    Ready,
    Degraded,
}

impl PredictorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictorState::Uninitialized => "uninitialized",
            PredictorState::Loading => "loading",
            PredictorState::Ready => "ready",
            PredictorState::Degraded => "degraded",
        }
    }

    pub(crate) fn as_gauge(&self) -> i64 {
        match self {
            PredictorState::Uninitialized => 0,
            PredictorState::Loading => 1,
            PredictorState::Ready => 2,
            PredictorState::Degraded => 3,
        }
    }
}

impl fmt::Display for PredictorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predictor configuration
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    /// Band used for records whose own band has no artifact
    pub default_band: Option<GradeBand>,
    pub output: OutputConfig,
    /// Instance name attached to structured log events
    pub instance_name: String,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            default_band: Some(GradeBand::High),
            output: OutputConfig::default(),
            instance_name: "risk-scorer".to_string(),
        }
    }
}

/// Result of loading a model directory
#[derive(Debug)]
pub struct LoadOutcome {
    pub predictor: RiskPredictor,
    /// Artifacts that failed to load; non-empty with a Ready predictor when
    /// only some bands loaded
    pub errors: Vec<ArtifactError>,
}

/// Scores feature vectors against loaded artifacts, falling back to the
/// heuristic per record whenever the model cannot serve a vector
pub struct RiskPredictor {
    state: PredictorState,
    artifacts: Vec<ModelArtifact>,
    config: PredictorConfig,
    formatter: RiskFormatter,
    standard_catalog: Arc<FeatureCatalog>,
    degraded_reason: Option<String>,
    metrics: ScorerMetrics,
    logger: StructuredLogger,
}

impl fmt::Debug for RiskPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskPredictor")
            .field("state", &self.state)
            .field("artifacts", &self.artifacts)
            .field("config", &self.config)
            .field("degraded_reason", &self.degraded_reason)
            .finish_non_exhaustive()
    }
}

impl RiskPredictor {
    fn uninitialized(config: PredictorConfig) -> Self {
        let metrics = ScorerMetrics::new();
        metrics.set_predictor_state(PredictorState::Uninitialized);
        Self {
            state: PredictorState::Uninitialized,
            artifacts: Vec::new(),
            formatter: RiskFormatter::with_config(config.output.clone()),
            standard_catalog: Arc::new(FeatureCatalog::standard()),
            degraded_reason: None,
            logger: StructuredLogger::new(config.instance_name.clone()),
            config,
            metrics,
        }
    }

    fn transition(&mut self, state: PredictorState) {
        debug!(from = %self.state, to = %state, "Predictor state transition");
        self.state = state;
        self.metrics.set_predictor_state(state);
    }

    /// Load every artifact under `model_dir`.
    ///
    /// Never fails: if nothing loads the predictor comes back `Degraded` and
    /// the load errors are returned for the host to report.
    pub fn load(model_dir: &Path, config: PredictorConfig) -> LoadOutcome {
        let mut predictor = Self::uninitialized(config);
        predictor.transition(PredictorState::Loading);

        let (artifacts, errors) = ModelArtifact::load_dir(model_dir);
        if artifacts.is_empty() {
            let reason = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            predictor
                .logger
                .log_model_load_failed(&model_dir.display().to_string(), &reason);
            predictor.enter_degraded(reason);
        } else {
            predictor.enter_ready(artifacts);
        }

        LoadOutcome { predictor, errors }
    }

    /// Build a predictor from artifacts already in memory
    pub fn with_artifacts(artifacts: Vec<ModelArtifact>, config: PredictorConfig) -> Self {
        let mut predictor = Self::uninitialized(config);
        predictor.transition(PredictorState::Loading);
        if artifacts.is_empty() {
            predictor.enter_degraded("no model artifacts supplied".to_string());
        } else {
            predictor.enter_ready(artifacts);
        }
        predictor
    }

    /// A predictor that serves only heuristic predictions
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::degraded_with_config(reason, PredictorConfig::default())
    }

    pub fn degraded_with_config(reason: impl Into<String>, config: PredictorConfig) -> Self {
        let mut predictor = Self::uninitialized(config);
        predictor.transition(PredictorState::Loading);
        predictor.enter_degraded(reason.into());
        predictor
    }

    fn enter_ready(&mut self, artifacts: Vec<ModelArtifact>) {
        for artifact in &artifacts {
            let band = artifact.grade_band().map(|b| b.as_str()).unwrap_or("any");
            let meta = artifact.metadata();
            self.metrics
                .set_model_info(&meta.model_version, band, meta.backend);
            self.logger.log_model_loaded(
                &meta.model_version,
                band,
                meta.backend,
                artifact.feature_names().len(),
            );
        }
        self.artifacts = artifacts;
        self.transition(PredictorState::Ready);
    }

    fn enter_degraded(&mut self, reason: String) {
        info!(reason = %reason, "Predictor entering degraded mode");
        self.degraded_reason = Some(reason);
        self.transition(PredictorState::Degraded);
    }

    pub fn state(&self) -> PredictorState {
        self.state
    }

    pub fn is_degraded(&self) -> bool {
        self.state == PredictorState::Degraded
    }

    /// Why no artifact could be loaded, in degraded mode
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded_reason.as_deref()
    }

    pub fn artifacts(&self) -> &[ModelArtifact] {
        &self.artifacts
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn formatter(&self) -> &RiskFormatter {
        &self.formatter
    }

    /// Model versions of the loaded artifacts, or the heuristic's tag
    pub fn model_versions(&self) -> Vec<String> {
        if self.artifacts.is_empty() {
            vec![FALLBACK_MODEL_VERSION.to_string()]
        } else {
            self.artifacts
                .iter()
                .map(|a| a.model_version().to_string())
                .collect()
        }
    }

    /// Artifact serving `band`: exact match, then the default band, then any
    pub fn artifact_for(&self, band: Option<GradeBand>) -> Option<&ModelArtifact> {
        let by_band = |wanted: Option<GradeBand>| {
            wanted.and_then(|b| self.artifacts.iter().find(|a| a.grade_band() == Some(b)))
        };
        by_band(band)
            .or_else(|| by_band(self.config.default_band))
            .or_else(|| self.artifacts.first())
    }

    /// Feature schema a record in `band` must be transformed to
    pub fn schema_for(&self, band: Option<GradeBand>) -> Arc<[String]> {
        match self.artifact_for(band) {
            Some(artifact) => artifact.feature_names().clone(),
            None => FallbackPredictor::schema(),
        }
    }

    /// Feature catalog used to build and explain vectors for `band`
    pub fn catalog_for(&self, band: Option<GradeBand>) -> Arc<FeatureCatalog> {
        match self.artifact_for(band) {
            Some(artifact) => artifact.catalog().clone(),
            None => self.standard_catalog.clone(),
        }
    }

    /// Loaded artifact whose schema this vector was built for
    fn artifact_matching(&self, vector: &FeatureVector) -> Option<&ModelArtifact> {
        self.artifacts
            .iter()
            .find(|a| a.feature_names().as_ref() == vector.feature_names.as_ref())
    }

    /// Score with the artifact matching the vector's schema, else the default
    /// artifact, reporting failures instead of falling back
    pub fn try_predict(&self, vector: &FeatureVector) -> Result<RiskResult, PredictionError> {
        if self.state != PredictorState::Ready {
            return Err(PredictionError::ModelUnavailable);
        }
        let artifact = self
            .artifact_matching(vector)
            .or_else(|| self.artifact_for(None))
            .ok_or(PredictionError::ModelUnavailable)?;
        self.score(artifact, None, vector)
    }

    /// Score with the artifact for `band`, reporting failures instead of falling back
    pub fn try_predict_for(
        &self,
        band: Option<GradeBand>,
        vector: &FeatureVector,
    ) -> Result<RiskResult, PredictionError> {
        if self.state != PredictorState::Ready {
            return Err(PredictionError::ModelUnavailable);
        }
        let artifact = self
            .artifact_for(band)
            .ok_or(PredictionError::ModelUnavailable)?;
        self.score(artifact, band, vector)
    }

    fn score(
        &self,
        artifact: &ModelArtifact,
        band: Option<GradeBand>,
        vector: &FeatureVector,
    ) -> Result<RiskResult, PredictionError> {
        let start = Instant::now();
        check_schema(artifact.feature_names(), vector)?;
        let success_probability = artifact.success_probability(&vector.values)?;

        let result = self.formatter.format(
            &vector.student_id,
            success_probability,
            data_coverage(artifact, vector),
            artifact.model_version(),
            band.or(artifact.grade_band()),
            PredictionSource::Model,
        );
        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());
        self.metrics.record_result(&result);
        Ok(result)
    }

    /// Score with the artifact the vector was built for; never fails
    pub fn predict(&self, vector: &FeatureVector) -> RiskResult {
        let outcome = self.try_predict(vector);
        self.or_fallback(outcome, None, vector)
    }

    /// Score with the artifact for `band`; any failure becomes a tagged
    /// heuristic result for this vector only
    pub fn predict_for(&self, band: Option<GradeBand>, vector: &FeatureVector) -> RiskResult {
        let outcome = self.try_predict_for(band, vector);
        self.or_fallback(outcome, band, vector)
    }

    fn or_fallback(
        &self,
        outcome: Result<RiskResult, PredictionError>,
        band: Option<GradeBand>,
        vector: &FeatureVector,
    ) -> RiskResult {
        match outcome {
            Ok(result) => result,
            Err(e) => {
                let reason = e.fallback_reason();
                // Degraded mode logged once at load, not per record
                if reason != FallbackReason::ModelUnavailable {
                    self.logger
                        .log_fallback(&vector.student_id, reason, &e.to_string());
                }
                self.fallback(band, vector, reason)
            }
        }
    }

    /// Score vectors independently; output order matches input order
    pub fn predict_batch(&self, vectors: &[FeatureVector]) -> Vec<RiskResult> {
        vectors.iter().map(|v| self.predict(v)).collect()
    }

    fn fallback(&self, band: Option<GradeBand>, vector: &FeatureVector, reason: FallbackReason) -> RiskResult {
        let start = Instant::now();
        let result = self.formatter.format(
            &vector.student_id,
            FallbackPredictor::success_probability(vector),
            FallbackPredictor::coverage(vector),
            FALLBACK_MODEL_VERSION,
            band,
            PredictionSource::Fallback { reason },
        );
        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_fallback(reason);
        self.metrics.record_result(&result);
        result
    }
}

/// The vector must carry exactly the artifact's schema, in order, with finite values
fn check_schema(expected: &[String], vector: &FeatureVector) -> Result<(), PredictionError> {
    let mismatch = |first_difference: Option<String>| PredictionError::SchemaMismatch {
        expected: expected.len(),
        actual: vector.values.len(),
        first_difference,
    };

    if vector.values.len() != expected.len() || vector.feature_names.len() != vector.values.len() {
        let detail = (vector.feature_names.len() != vector.values.len()).then(|| {
            format!(
                "vector names {} features but carries {} values",
                vector.feature_names.len(),
                vector.values.len()
            )
        });
        return Err(mismatch(detail));
    }

    if let Some((i, (want, got))) = expected
        .iter()
        .zip(vector.feature_names.iter())
        .enumerate()
        .find(|(_, (want, got))| want != got)
    {
        return Err(mismatch(Some(format!(
            "position {}: expected {}, got {}",
            i, want, got
        ))));
    }

    if let Some(i) = vector.values.iter().position(|v| !v.is_finite()) {
        return Err(mismatch(Some(format!(
            "position {}: non-finite value for {}",
            i, expected[i]
        ))));
    }

    Ok(())
}

/// Share of model importance carried by observed features
fn data_coverage(artifact: &ModelArtifact, vector: &FeatureVector) -> f64 {
    let n = vector.values.len();
    if n == 0 || vector.observed.len() != n {
        return 0.0;
    }
    if let Some(importances) = artifact.valid_importances() {
        let total: f64 = importances.iter().sum();
        let observed: f64 = importances
            .iter()
            .zip(&vector.observed)
            .filter(|(_, seen)| **seen)
            .map(|(w, _)| w)
            .sum();
        if total > 0.0 {
            return observed / total;
        }
    }
    vector.observed.iter().filter(|seen| **seen).count() as f64 / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::test_support::{degraded_predictor, high_school_artifact, ready_predictor};
    use crate::predictor::DEGRADED_CONFIDENCE_CEILING;
    use tempfile::TempDir;

    fn full_vector(predictor: &RiskPredictor, id: &str, values: Vec<f32>) -> FeatureVector {
        FeatureVector::from_values(id, predictor.schema_for(Some(GradeBand::High)), values)
    }

    fn typical_values() -> Vec<f32> {
        vec![2.8, 0.92, 76.0, 76.0, 2.0, 0.3, 0.4, 4.0]
    }

    #[test]
    fn test_ready_prediction_uses_model() {
        let predictor = ready_predictor();
        assert_eq!(predictor.state(), PredictorState::Ready);

        let vector = full_vector(&predictor, "s-1", typical_values());
        let result = predictor.try_predict(&vector).unwrap();
        assert_eq!(result.source, PredictionSource::Model);
        assert_eq!(result.model_version, "hs-logreg-2024.08");
        // at the training means the logit is the intercept
        assert!((result.success_probability - crate::predictor::inference::sigmoid(0.8)).abs() < 1e-6);
        assert!((result.risk_probability - (1.0 - result.success_probability)).abs() < 1e-12);
        assert_eq!(result.data_coverage, 1.0);
    }

    #[test]
    fn test_length_mismatch_falls_back_for_that_record() {
        let predictor = ready_predictor();
        let short = FeatureVector::from_values(
            "short",
            vec!["gpa".to_string(), "attendance_rate".to_string()].into(),
            vec![3.0, 0.95],
        );

        let err = predictor.try_predict(&short).unwrap_err();
        assert!(matches!(err, PredictionError::SchemaMismatch { expected: 8, actual: 2, .. }));

        let result = predictor.predict(&short);
        assert_eq!(
            result.source,
            PredictionSource::Fallback {
                reason: FallbackReason::SchemaMismatch
            }
        );
        assert_eq!(result.model_version, FALLBACK_MODEL_VERSION);
        assert!(result.confidence <= DEGRADED_CONFIDENCE_CEILING);
        assert_eq!(predictor.state(), PredictorState::Ready);
    }

    #[test]
    fn test_order_mismatch_detected() {
        let predictor = ready_predictor();
        let mut names: Vec<String> = predictor.schema_for(None).iter().cloned().collect();
        names.swap(2, 3);
        let vector = FeatureVector::from_values("swapped", names.into(), typical_values());

        match predictor.try_predict(&vector) {
            Err(PredictionError::SchemaMismatch {
                first_difference: Some(detail),
                ..
            }) => assert!(detail.starts_with("position 2"), "{}", detail),
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_vector_rejected() {
        let predictor = ready_predictor();
        let mut values = typical_values();
        values[0] = f32::NAN;
        let vector = full_vector(&predictor, "nan", values);
        assert!(predictor.try_predict(&vector).is_err());
        assert!(predictor.predict(&vector).source.is_fallback());
    }

    #[test]
    fn test_batch_preserves_order_and_isolates_failures() {
        let predictor = ready_predictor();
        let bad = FeatureVector::from_values("r2", vec!["gpa".to_string()].into(), vec![1.0]);
        let vectors = vec![
            full_vector(&predictor, "r1", typical_values()),
            bad,
            full_vector(&predictor, "r3", vec![3.9, 0.99, 95.0, 95.0, 0.0, 0.0, 0.0, 8.0]),
        ];

        let results = predictor.predict_batch(&vectors);
        let ids: Vec<&str> = results.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
        assert_eq!(results[0].source, PredictionSource::Model);
        assert!(results[1].source.is_fallback());
        assert_eq!(results[2].source, PredictionSource::Model);
    }

    #[test]
    fn test_batch_routes_each_vector_to_its_schema() {
        let predictor = ready_predictor();
        let middle = FeatureVector::from_values(
            "m-1",
            predictor.schema_for(Some(GradeBand::Middle)),
            vec![2.9, 0.93, 78.0, 1.5, 0.5, 1.0],
        );
        let vectors = vec![
            full_vector(&predictor, "h-1", typical_values()),
            middle,
            full_vector(&predictor, "h-2", typical_values()),
        ];

        let results = predictor.predict_batch(&vectors);
        assert!(results.iter().all(|r| r.source == PredictionSource::Model));
        let versions: Vec<&str> = results.iter().map(|r| r.model_version.as_str()).collect();
        assert_eq!(versions, ["hs-logreg-2024.08", "ms-logreg-2024.08", "hs-logreg-2024.08"]);
        assert_eq!(results[1].grade_band, Some(GradeBand::Middle));
        // at the training means the logit is the intercept
        assert!((results[1].success_probability - crate::predictor::inference::sigmoid(0.9)).abs() < 1e-6);
        assert_eq!(results[1].data_coverage, 1.0);
    }

    #[test]
    fn test_degraded_mode_serves_heuristic() {
        let predictor = degraded_predictor();
        assert_eq!(predictor.state(), PredictorState::Degraded);
        assert!(predictor.degraded_reason().is_some());

        let vector = FeatureVector::from_values(
            "s-1",
            FallbackPredictor::schema(),
            vec![3.9, 0.99, 0.0],
        );
        assert!(matches!(predictor.try_predict(&vector), Err(PredictionError::ModelUnavailable)));

        let result = predictor.predict(&vector);
        assert_eq!(result.model_version, FALLBACK_MODEL_VERSION);
        assert!(result.confidence <= DEGRADED_CONFIDENCE_CEILING);
        assert!(result.success_probability > 0.9);
        assert_eq!(
            result.source,
            PredictionSource::Fallback {
                reason: FallbackReason::ModelUnavailable
            }
        );
    }

    #[test]
    fn test_load_missing_directory_degrades() {
        let dir = TempDir::new().unwrap();
        let outcome = RiskPredictor::load(&dir.path().join("absent"), PredictorConfig::default());
        assert_eq!(outcome.predictor.state(), PredictorState::Degraded);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.predictor.model_versions(), vec![FALLBACK_MODEL_VERSION.to_string()]);
    }

    #[test]
    fn test_load_demo_models() {
        let models = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models");
        let outcome = RiskPredictor::load(&models, PredictorConfig::default());
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert_eq!(outcome.predictor.state(), PredictorState::Ready);
        assert_eq!(outcome.predictor.artifacts().len(), 2);
    }

    #[test]
    fn test_band_routing() {
        let predictor = ready_predictor();
        let high = predictor.artifact_for(Some(GradeBand::High)).unwrap();
        assert_eq!(high.grade_band(), Some(GradeBand::High));
        let middle = predictor.artifact_for(Some(GradeBand::Middle)).unwrap();
        assert_eq!(middle.grade_band(), Some(GradeBand::Middle));
        // no elementary artifact: the default band serves it
        let elementary = predictor.artifact_for(Some(GradeBand::Elementary)).unwrap();
        assert_eq!(elementary.grade_band(), Some(GradeBand::High));
        assert_eq!(predictor.schema_for(Some(GradeBand::Middle)).len(), 6);
    }

    #[test]
    fn test_without_default_band_uses_first_artifact() {
        let config = PredictorConfig {
            default_band: None,
            ..PredictorConfig::default()
        };
        let predictor = RiskPredictor::with_artifacts(vec![high_school_artifact()], config);
        assert!(predictor.artifact_for(Some(GradeBand::Elementary)).is_some());
        assert!(RiskPredictor::with_artifacts(Vec::new(), PredictorConfig::default()).is_degraded());
    }

    #[test]
    fn test_coverage_weights_by_importance() {
        let predictor = ready_predictor();
        let artifact = predictor.artifact_for(None).unwrap();
        let mut observed = vec![false; 8];
        observed[0] = true; // gpa 0.30
        observed[1] = true; // attendance 0.25
        let vector = FeatureVector::new("s", artifact.feature_names().clone(), typical_values(), observed);
        assert!((data_coverage(artifact, &vector) - 0.55).abs() < 1e-9);

        let sparse = predictor.predict(&vector);
        let full = predictor.predict(&full_vector(&predictor, "s", typical_values()));
        assert_eq!(sparse.success_probability, full.success_probability);
        assert!(sparse.confidence < full.confidence);
    }
}
