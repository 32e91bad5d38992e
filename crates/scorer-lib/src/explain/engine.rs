//! Contribution scoring and ranking of risk and protective factors
//!
//! A factor's score is its importance-weighted deviation from the catalog
//! reference, signed by polarity. Unobserved and neutral features never rank.

use super::types::{
    ConfidenceLevel, Explanation, FactorSeverity, ImportanceSource, ProtectiveFactor, RiskFactor,
};
use crate::features::{FeatureCatalog, FeatureSpec, Polarity};
use crate::models::{FeatureVector, PredictionSource, RiskResult};
use crate::predictor::importances_are_valid;
use std::cmp::Ordering;

/// Factors reported per side by default
pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone)]
pub struct ExplainConfig {
    /// Maximum factors reported on each side
    pub top_n: usize,
    /// Contributions at or below this magnitude are treated as zero
    pub min_contribution: f64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            min_contribution: 1e-9,
        }
    }
}

struct Contribution<'a> {
    spec: &'a FeatureSpec,
    value: f64,
    deviation: f64,
    score: f64,
}

/// Turns a result and its feature vector into ranked factors
#[derive(Debug, Clone, Default)]
pub struct ExplanationEngine {
    config: ExplainConfig,
}

impl ExplanationEngine {
    pub fn new(config: ExplainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    /// Explain `result` from the vector it was computed on.
    ///
    /// `importances` are positional with the vector; when they are absent or
    /// malformed every feature weighs 1 and factors rank by raw deviation.
    /// Defaulted, neutral and uncatalogued features never become factors.
    pub fn explain(
        &self,
        result: &RiskResult,
        vector: &FeatureVector,
        importances: &[f64],
        catalog: &FeatureCatalog,
    ) -> Explanation {
        let importance_source = if importances_are_valid(importances, vector.len()) {
            ImportanceSource::Model
        } else {
            ImportanceSource::DeviationOnly
        };

        let mut contributions: Vec<Contribution<'_>> = vector
            .feature_names
            .iter()
            .zip(vector.values.iter().zip(&vector.observed))
            .enumerate()
            .filter(|(_, (_, (_, observed)))| **observed)
            .filter_map(|(i, (name, (value, _)))| {
                let spec = catalog.get(name)?;
                if spec.polarity == Polarity::Neutral {
                    return None;
                }
                let value = f64::from(*value);
                let deviation = spec.normalized_deviation(value);
                let weight = match importance_source {
                    ImportanceSource::Model => importances[i],
                    ImportanceSource::DeviationOnly => 1.0,
                };
                Some(Contribution {
                    spec,
                    value,
                    deviation,
                    score: weight * deviation,
                })
            })
            .filter(|c| c.score.abs() > self.config.min_contribution)
            .collect();

        contributions.sort_by(|a, b| {
            b.score
                .abs()
                .partial_cmp(&a.score.abs())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.spec.name.cmp(&b.spec.name))
        });

        let risk_factors: Vec<RiskFactor> = contributions
            .iter()
            .filter(|c| c.score < 0.0)
            .take(self.config.top_n)
            .map(|c| RiskFactor {
                feature: c.spec.name.clone(),
                label: c.spec.label.clone(),
                domain: c.spec.domain,
                severity: FactorSeverity::from_deviation(c.deviation),
                value: c.value,
                deviation: c.deviation,
                contribution: c.score,
            })
            .collect();

        let protective_factors: Vec<ProtectiveFactor> = contributions
            .iter()
            .filter(|c| c.score > 0.0)
            .take(self.config.top_n)
            .map(|c| ProtectiveFactor {
                feature: c.spec.name.clone(),
                label: c.spec.label.clone(),
                domain: c.spec.domain,
                value: c.value,
                deviation: c.deviation,
                contribution: c.score,
            })
            .collect();

        let confidence_level = ConfidenceLevel::from_confidence(result.confidence);

        Explanation {
            student_id: result.student_id.clone(),
            model_version: result.model_version.clone(),
            risk_factors,
            protective_factors,
            narrative_confidence: result.confidence,
            confidence_level,
            confidence_statement: confidence_statement(result, confidence_level),
            caveat: None,
            importance_source,
        }
    }
}

fn confidence_statement(result: &RiskResult, level: ConfidenceLevel) -> String {
    let mut statement = format!(
        "{} confidence ({:.2}); {:.0}% of model inputs were present in the record",
        capitalize(level.as_str()),
        result.confidence,
        result.data_coverage * 100.0
    );
    if let PredictionSource::Fallback { reason } = result.source {
        statement.push_str(&format!(
            "; estimated by the fallback heuristic ({}), treat as a rough indication",
            reason.as_str()
        ));
    }
    statement
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FactorDomain;
    use crate::models::{FallbackReason, RiskCategory};
    use std::sync::Arc;

    fn result(confidence: f64, source: PredictionSource) -> RiskResult {
        RiskResult {
            student_id: "s-1".into(),
            success_probability: 0.5,
            risk_probability: 0.5,
            risk_category: RiskCategory::Moderate,
            confidence,
            data_coverage: 0.5,
            model_version: "v1".into(),
            grade_band: None,
            source,
            generated_at: 0,
        }
    }

    fn vector(pairs: &[(&str, f32)]) -> FeatureVector {
        let names: Arc<[String]> = pairs.iter().map(|(n, _)| n.to_string()).collect::<Vec<_>>().into();
        FeatureVector::from_values("s-1", names, pairs.iter().map(|(_, v)| *v).collect())
    }

    #[test]
    fn test_factors_split_by_direction() {
        let engine = ExplanationEngine::default();
        let catalog = FeatureCatalog::standard();
        let v = vector(&[("gpa", 1.8), ("attendance_rate", 0.98), ("discipline_incidents", 4.0)]);
        let explanation = engine.explain(&result(0.5, PredictionSource::Model), &v, &[0.5, 0.3, 0.2], &catalog);

        assert_eq!(explanation.importance_source, ImportanceSource::Model);
        let risk: Vec<&str> = explanation.risk_factors.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(risk, vec!["gpa", "discipline_incidents"]);
        assert_eq!(explanation.protective_factors.len(), 1);
        assert_eq!(explanation.protective_factors[0].feature, "attendance_rate");
        assert!(explanation.risk_factors.iter().all(|f| f.contribution < 0.0));
        assert_eq!(explanation.dominant_domain(), Some(FactorDomain::Academic));
    }

    #[test]
    fn test_higher_is_risk_polarity() {
        let engine = ExplanationEngine::default();
        let catalog = FeatureCatalog::standard();
        let v = vector(&[("discipline_incidents", 5.0), ("missing_assignments", 0.0)]);
        let explanation = engine.explain(&result(0.5, PredictionSource::Model), &v, &[0.5, 0.5], &catalog);
        assert_eq!(explanation.risk_factors.len(), 1);
        assert_eq!(explanation.risk_factors[0].severity, FactorSeverity::High);
        // at reference: zero contribution, not a factor
        assert!(explanation.protective_factors.is_empty());
    }

    #[test]
    fn test_never_pads_and_respects_top_n() {
        let engine = ExplanationEngine::new(ExplainConfig {
            top_n: 2,
            ..ExplainConfig::default()
        });
        let catalog = FeatureCatalog::standard();
        let v = vector(&[
            ("gpa", 1.0),
            ("attendance_rate", 0.6),
            ("current_score", 40.0),
            ("course_failures", 2.0),
        ]);
        let explanation = engine.explain(&result(0.5, PredictionSource::Model), &v, &[0.25; 4], &catalog);
        assert_eq!(explanation.risk_factors.len(), 2);
        assert!(explanation.protective_factors.is_empty());
        assert!(explanation.risk_factors[0].contribution.abs() >= explanation.risk_factors[1].contribution.abs());
    }

    #[test]
    fn test_defaulted_neutral_and_unknown_features_skipped() {
        let engine = ExplanationEngine::default();
        let catalog = FeatureCatalog::standard();
        let names: Arc<[String]> = ["gpa", "ell_status", "mystery_metric"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into();
        let v = FeatureVector::new("s-1", names, vec![0.5, 1.0, 99.0], vec![false, true, true]);
        let explanation = engine.explain(&result(0.5, PredictionSource::Model), &v, &[0.4, 0.3, 0.3], &catalog);
        assert!(explanation.risk_factors.is_empty());
        assert!(explanation.protective_factors.is_empty());
    }

    #[test]
    fn test_malformed_importances_fall_back_to_deviation() {
        let engine = ExplanationEngine::default();
        let catalog = FeatureCatalog::standard();
        let v = vector(&[("gpa", 1.8), ("attendance_rate", 0.75)]);
        for importances in [&[][..], &[0.7, 0.7][..], &[1.0][..], &[f64::NAN, 1.0][..]] {
            let explanation = engine.explain(&result(0.5, PredictionSource::Model), &v, importances, &catalog);
            assert_eq!(explanation.importance_source, ImportanceSource::DeviationOnly);
            // raw deviation: attendance -0.85 outranks gpa -0.5
            assert_eq!(explanation.risk_factors[0].feature, "attendance_rate");
            assert!((explanation.risk_factors[0].contribution + 0.85).abs() < 1e-6);
        }
    }

    #[test]
    fn test_confidence_statement() {
        let engine = ExplanationEngine::default();
        let catalog = FeatureCatalog::standard();
        let v = vector(&[("gpa", 3.0)]);

        let confident = engine.explain(&result(0.82, PredictionSource::Model), &v, &[1.0], &catalog);
        assert_eq!(confident.confidence_level, ConfidenceLevel::High);
        assert_eq!(confident.narrative_confidence, 0.82);
        assert!(confident.confidence_statement.starts_with("High confidence (0.82)"));

        let fallback = PredictionSource::Fallback {
            reason: FallbackReason::ModelUnavailable,
        };
        let degraded = engine.explain(&result(0.3, fallback), &v, &[], &catalog);
        assert_eq!(degraded.confidence_level, ConfidenceLevel::Low);
        assert!(degraded.confidence_statement.contains("model_unavailable"));
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(FactorSeverity::from_deviation(-0.1), FactorSeverity::Low);
        assert_eq!(FactorSeverity::from_deviation(-0.3), FactorSeverity::Moderate);
        assert_eq!(FactorSeverity::from_deviation(-0.6), FactorSeverity::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.4), ConfidenceLevel::Moderate);
        assert_eq!(ConfidenceLevel::from_confidence(0.39), ConfidenceLevel::Low);
    }
}
