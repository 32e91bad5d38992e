//! End-to-end scoring pipeline
//!
//! record → FeatureEngineer → RiskPredictor → ExplanationEngine →
//! InterventionAdvisor. Constructed once at startup and shared by
//! reference; every call allocates its own vector, result and explanation.

use crate::advisor::{InterventionAdvisor, InterventionCategory};
use crate::error::ArtifactError;
use crate::explain::{ExplainConfig, Explanation, ExplanationEngine};
use crate::features::{DefaultedFeature, FeatureEngineer};
use crate::models::{FeatureVector, GradeBand, RiskResult, StudentRecord};
use crate::observability::{ScorerMetrics, StructuredLogger};
use crate::predictor::{PredictorConfig, RiskPredictor};
use serde::Serialize;
use std::path::Path;

/// Configuration for the whole pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub predictor: PredictorConfig,
    pub explain: ExplainConfig,
}

/// Everything the pipeline produces for one record
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub result: RiskResult,
    pub explanation: Explanation,
    pub interventions: Vec<InterventionCategory>,
    /// Features substituted with defaults; never fatal
    pub defaulted: Vec<DefaultedFeature>,
}

struct Prepared {
    band: Option<GradeBand>,
    vector: FeatureVector,
    defaulted: Vec<DefaultedFeature>,
}

pub struct EarlyWarningPipeline {
    predictor: RiskPredictor,
    band_detector: FeatureEngineer,
    explainer: ExplanationEngine,
    advisor: InterventionAdvisor,
    metrics: ScorerMetrics,
    logger: StructuredLogger,
}

impl EarlyWarningPipeline {
    pub fn new(predictor: RiskPredictor, explain: ExplainConfig) -> Self {
        let logger = StructuredLogger::new(predictor.config().instance_name.clone());
        Self {
            predictor,
            band_detector: FeatureEngineer::default(),
            explainer: ExplanationEngine::new(explain),
            advisor: InterventionAdvisor::new(),
            metrics: ScorerMetrics::new(),
            logger,
        }
    }

    /// Load artifacts from `model_dir` and build the pipeline.
    ///
    /// Load errors are returned for reporting; the pipeline itself always
    /// comes back usable, in degraded mode if nothing loaded.
    pub fn load(model_dir: &Path, config: PipelineConfig) -> (Self, Vec<ArtifactError>) {
        let outcome = RiskPredictor::load(model_dir, config.predictor);
        (Self::new(outcome.predictor, config.explain), outcome.errors)
    }

    pub fn predictor(&self) -> &RiskPredictor {
        &self.predictor
    }

    fn prepare(&self, record: &StudentRecord) -> Prepared {
        let band = self.band_detector.grade_band(record);
        let engineer = FeatureEngineer::new(self.predictor.catalog_for(band));
        let report = engineer.transform_with_report(record, &self.predictor.schema_for(band));

        for defaulted in &report.defaulted {
            self.metrics.inc_defaulted_features(defaulted.reason.as_str(), 1);
        }
        let names: Vec<String> = report.defaulted.iter().map(|d| d.feature.clone()).collect();
        self.logger.log_defaulted_fields(record.student_id(), &names);

        Prepared {
            band,
            vector: report.vector,
            defaulted: report.defaulted,
        }
    }

    fn score(&self, prepared: &Prepared) -> RiskResult {
        let result = self.predictor.predict_for(prepared.band, &prepared.vector);
        self.logger.log_prediction(&result);
        result
    }

    fn explain_prepared(&self, prepared: &Prepared, result: &RiskResult) -> Explanation {
        let band = prepared.band;
        let importances = self
            .predictor
            .artifact_for(band)
            .filter(|a| a.feature_names() == &prepared.vector.feature_names)
            .map(|a| a.feature_importances())
            .unwrap_or(&[]);
        let mut explanation = self.explainer.explain(
            result,
            &prepared.vector,
            importances,
            &self.predictor.catalog_for(band),
        );
        explanation.caveat = self.predictor.formatter().low_confidence_reason(result);
        explanation
    }

    /// Score one record
    pub fn predict_one(&self, record: &StudentRecord) -> RiskResult {
        self.score(&self.prepare(record))
    }

    /// Score records independently; output order matches input order
    pub fn predict_many(&self, records: &[StudentRecord]) -> Vec<RiskResult> {
        records.iter().map(|r| self.predict_one(r)).collect()
    }

    /// Score one record and explain the result
    pub fn explain(&self, record: &StudentRecord) -> (RiskResult, Explanation) {
        let prepared = self.prepare(record);
        let result = self.score(&prepared);
        let explanation = self.explain_prepared(&prepared, &result);
        (result, explanation)
    }

    pub fn suggest_interventions(
        &self,
        result: &RiskResult,
        explanation: &Explanation,
    ) -> Vec<InterventionCategory> {
        self.advisor.suggest(result, explanation)
    }

    /// Prediction, explanation, interventions and input diagnostics in one call
    pub fn assess(&self, record: &StudentRecord) -> Assessment {
        let prepared = self.prepare(record);
        let result = self.score(&prepared);
        let explanation = self.explain_prepared(&prepared, &result);
        let interventions = self.advisor.suggest(&result, &explanation);
        Assessment {
            result,
            explanation,
            interventions,
            defaulted: prepared.defaulted,
        }
    }
}

#[cfg(test)]
mod tests;
