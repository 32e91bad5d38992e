use super::*;
use crate::advisor::InterventionCategory;
use crate::explain::ImportanceSource;
use crate::features::DefaultReason;
use crate::models::{FallbackReason, FieldValue, PredictionSource, RiskCategory};
use crate::predictor::test_support::{degraded_predictor, ready_predictor};
use crate::predictor::{PredictorState, DEGRADED_CONFIDENCE_CEILING, FALLBACK_MODEL_VERSION};

fn pipeline() -> EarlyWarningPipeline {
    EarlyWarningPipeline::new(ready_predictor(), ExplainConfig::default())
}

fn degraded_pipeline() -> EarlyWarningPipeline {
    EarlyWarningPipeline::new(degraded_predictor(), ExplainConfig::default())
}

fn record(id: &str, fields: &[(&str, f64)]) -> StudentRecord {
    fields.iter().fold(StudentRecord::with_id(id), |r, (k, v)| {
        r.with_field(k, FieldValue::Number(*v))
    })
}

fn feature_names<T, F: Fn(&T) -> &str>(items: &[T], name: F) -> Vec<&str> {
    items.iter().map(name).collect()
}

#[test]
fn test_strong_student_is_low_risk_with_protective_factors() {
    let pipeline = pipeline();
    let (result, explanation) = pipeline.explain(&record("s-strong", &[("gpa", 3.8), ("attendance_rate", 0.98)]));

    assert!(result.success_probability > 0.75, "p={}", result.success_probability);
    assert_eq!(result.risk_category, RiskCategory::Low);
    assert_eq!(result.source, PredictionSource::Model);
    assert!(explanation.risk_factors.len() <= 1);

    let protective = feature_names(&explanation.protective_factors, |f| f.feature.as_str());
    assert_eq!(protective[..2], ["gpa", "attendance_rate"]);
    assert_eq!(explanation.importance_source, ImportanceSource::Model);
    assert_eq!(explanation.caveat, None);
}

#[test]
fn test_weighted_gpa_reads_as_strong() {
    let pipeline = pipeline();
    let (result, explanation) = pipeline.explain(&record("s-honors", &[("gpa", 4.3), ("attendance_rate", 0.97)]));

    assert_eq!(result.risk_category, RiskCategory::Low);
    assert!(explanation.risk_factors.iter().all(|f| f.feature != "gpa"));
    let top = &explanation.protective_factors[0];
    assert_eq!(top.feature, "gpa");
    assert_eq!(top.value, 4.0);
}

#[test]
fn test_struggling_student_is_high_risk() {
    let pipeline = pipeline();
    let (result, explanation) = pipeline.explain(&record("s-weak", &[("gpa", 1.8), ("attendance_rate", 0.75)]));

    assert_eq!(result.risk_category, RiskCategory::High);
    assert!(result.confidence > 0.3, "confidence={}", result.confidence);

    let risk = feature_names(&explanation.risk_factors, |f| f.feature.as_str());
    assert_eq!(risk[..2], ["attendance_rate", "gpa"]);

    let interventions = pipeline.suggest_interventions(&result, &explanation);
    assert_eq!(interventions[0], InterventionCategory::AttendanceOutreach);
    assert!(interventions.contains(&InterventionCategory::AcademicSupport));
}

#[test]
fn test_sparse_record_completes_with_reduced_confidence() {
    let pipeline = pipeline();
    let sparse = pipeline.assess(&StudentRecord::with_id("s-empty"));

    assert_eq!(sparse.result.source, PredictionSource::Model);
    assert_eq!(sparse.result.data_coverage, 0.0);
    assert_eq!(sparse.defaulted.len(), 8);
    assert!(sparse.defaulted.iter().all(|d| d.reason == DefaultReason::Missing));
    assert!(sparse.explanation.risk_factors.is_empty());
    assert!(sparse.explanation.protective_factors.is_empty());

    // same values, every field supplied
    let full = pipeline.predict_one(&record(
        "s-full",
        &[
            ("gpa", 2.8),
            ("attendance_rate", 0.92),
            ("early_avg_score", 76.0),
            ("current_score", 76.0),
            ("missing_assignments", 0.0),
            ("course_failures", 0.0),
            ("discipline_incidents", 0.0),
            ("lms_logins_per_week", 4.0),
        ],
    ));
    assert!((full.success_probability - sparse.result.success_probability).abs() < 1e-9);
    assert_eq!(full.data_coverage, 1.0);
    assert!(sparse.result.confidence < full.confidence);
    assert!(sparse
        .explanation
        .caveat
        .as_deref()
        .unwrap()
        .contains("missing"));
}

#[test]
fn test_degraded_pipeline_still_answers() {
    let pipeline = degraded_pipeline();
    assert_eq!(pipeline.predictor().state(), PredictorState::Degraded);

    let assessment = pipeline.assess(&record("s-1", &[("gpa", 3.9), ("attendance_rate", 0.99)]));
    let result = &assessment.result;
    assert!(result.confidence <= DEGRADED_CONFIDENCE_CEILING);
    assert_eq!(result.model_version, FALLBACK_MODEL_VERSION);
    assert_eq!(
        result.source,
        PredictionSource::Fallback {
            reason: FallbackReason::ModelUnavailable
        }
    );
    assert_eq!(result.risk_category, RiskCategory::Low);
    assert_eq!(assessment.explanation.importance_source, ImportanceSource::DeviationOnly);
    assert!(!assessment.explanation.protective_factors.is_empty());
    assert!(assessment.interventions.contains(&InterventionCategory::DataReview));
    assert!(assessment
        .explanation
        .caveat
        .as_deref()
        .unwrap()
        .contains("fallback heuristic"));
}

#[test]
fn test_predict_many_preserves_order() {
    let pipeline = pipeline();
    let records = vec![
        record("a", &[("gpa", 1.2)]),
        StudentRecord::with_id("b"),
        record("c", &[("gpa", 3.9), ("grade_level", 7.0)]),
    ];
    let results = pipeline.predict_many(&records);
    let ids = feature_names(&results, |r| r.student_id.as_str());
    assert_eq!(ids, ["a", "b", "c"]);
    assert!(results[0].risk_probability > results[1].risk_probability);
}

#[test]
fn test_records_route_to_their_grade_band() {
    let pipeline = pipeline();
    let middle = pipeline.predict_one(&record("m-1", &[("grade_level", 7.0), ("gpa", 3.0)]));
    assert_eq!(middle.grade_band, Some(GradeBand::Middle));
    assert_eq!(middle.model_version, "ms-logreg-2024.08");

    let high = pipeline.predict_one(&record("h-1", &[("grade_level", 11.0), ("gpa", 3.0)]));
    assert_eq!(high.model_version, "hs-logreg-2024.08");

    // no elementary model: default band serves it, tagged with the record's band
    let elementary = pipeline.predict_one(&record("e-1", &[("grade_level", 3.0)]));
    assert_eq!(elementary.model_version, "hs-logreg-2024.08");
    assert_eq!(elementary.grade_band, Some(GradeBand::Elementary));
}

#[test]
fn test_messy_export_row() {
    let pipeline = pipeline();
    let row = serde_json::json!({
        "SIS User ID": 40213,
        "Cumulative GPA": "1.9",
        "Attendance %": "78%",
        "Unposted Current Score": "N/A",
        "Quiz 1": 55,
        "Quiz 2": "missing",
        "Homework 3": null,
        "Office Referrals": -2
    });
    let record = StudentRecord::from_json(&row).unwrap();
    assert_eq!(record.student_id(), "40213");

    let assessment = pipeline.assess(&record);
    assert!(assessment.result.risk_probability > 0.5);
    let invalid: Vec<&str> = assessment
        .defaulted
        .iter()
        .filter(|d| matches!(d.reason, DefaultReason::Invalid { .. }))
        .map(|d| d.feature.as_str())
        .collect();
    assert_eq!(invalid, ["discipline_incidents"]);
}

#[test]
fn test_pipeline_is_shareable_across_threads() {
    let pipeline = pipeline();
    let record = record("s-1", &[("gpa", 2.4), ("attendance_rate", 0.88)]);
    let expected = pipeline.predict_one(&record).risk_probability;

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| pipeline.predict_one(&record).risk_probability))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_load_from_directory() {
    let models = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models");
    let (pipeline, errors) = EarlyWarningPipeline::load(&models, PipelineConfig::default());
    assert!(errors.is_empty());
    assert_eq!(pipeline.predictor().state(), PredictorState::Ready);

    let dir = tempfile::TempDir::new().unwrap();
    let (degraded, errors) = EarlyWarningPipeline::load(dir.path(), PipelineConfig::default());
    assert_eq!(errors.len(), 1);
    assert!(degraded.predictor().is_degraded());
    assert!(degraded.predict_one(&StudentRecord::with_id("x")).source.is_fallback());
}
