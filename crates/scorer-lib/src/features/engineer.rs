//! Record-to-vector transform
//!
//! Maps a heterogeneous `StudentRecord` onto the ordered schema a model
//! expects. Never fails: every feature without a usable value is replaced
//! by its catalog default and reported as a diagnostic.

use super::catalog::{key_matches, FeatureCatalog, FeatureKind, FeatureSource, FeatureSpec, Reading};
use crate::models::{FeatureVector, FieldValue, GradeBand, StudentRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Why a feature was filled from defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefaultReason {
    /// No source field was present
    Missing,
    /// A source field was present but out of range or unparseable
    Invalid { raw: String },
    /// The schema names a feature the catalog does not describe
    Unrecognized,
}

impl DefaultReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultReason::Missing => "missing",
            DefaultReason::Invalid { .. } => "invalid",
            DefaultReason::Unrecognized => "unrecognized",
        }
    }
}

/// Non-blocking diagnostic for one defaulted feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultedFeature {
    pub feature: String,
    pub reason: DefaultReason,
}

/// A transformed vector together with its input diagnostics
#[derive(Debug, Clone)]
pub struct TransformReport {
    pub vector: FeatureVector,
    pub defaulted: Vec<DefaultedFeature>,
}

/// Converts raw records into model-ready feature vectors
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    catalog: Arc<FeatureCatalog>,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new(Arc::new(FeatureCatalog::standard()))
    }
}

impl FeatureEngineer {
    pub fn new(catalog: Arc<FeatureCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<FeatureCatalog> {
        &self.catalog
    }

    /// Build the feature vector for `target_schema`
    pub fn transform(&self, record: &StudentRecord, target_schema: &Arc<[String]>) -> FeatureVector {
        self.transform_with_report(record, target_schema).vector
    }

    /// Build the feature vector and report which features were defaulted
    pub fn transform_with_report(
        &self,
        record: &StudentRecord,
        target_schema: &Arc<[String]>,
    ) -> TransformReport {
        let mut values = Vec::with_capacity(target_schema.len());
        let mut observed = Vec::with_capacity(target_schema.len());
        let mut defaulted = Vec::new();

        for name in target_schema.iter() {
            let Some(spec) = self.catalog.get(name) else {
                values.push(0.0);
                observed.push(false);
                defaulted.push(DefaultedFeature {
                    feature: name.clone(),
                    reason: DefaultReason::Unrecognized,
                });
                continue;
            };

            match resolve(spec, record).and_then(finite_f32) {
                Ok(value) => {
                    values.push(value);
                    observed.push(true);
                }
                Err(reason) => {
                    values.push(finite_f32(spec.fallback_value()).unwrap_or(0.0));
                    observed.push(false);
                    defaulted.push(DefaultedFeature {
                        feature: name.clone(),
                        reason,
                    });
                }
            }
        }

        if !defaulted.is_empty() {
            debug!(
                student_id = %record.student_id(),
                defaulted = defaulted.len(),
                schema_len = target_schema.len(),
                "Substituted defaults for missing or invalid fields"
            );
        }

        TransformReport {
            vector: FeatureVector::new(record.student_id(), target_schema.clone(), values, observed),
            defaulted,
        }
    }

    /// Grade band of a record, from an explicit band field or its grade level
    pub fn grade_band(&self, record: &StudentRecord) -> Option<GradeBand> {
        if let Some(band) = ["grade_band", "school_level", "band"]
            .iter()
            .filter_map(|key| record.get(key))
            .filter_map(FieldValue::as_text)
            .find_map(GradeBand::parse)
        {
            return Some(band);
        }

        let level = match self.catalog.get("grade_level") {
            Some(spec) => resolve(spec, record).ok(),
            None => record
                .get("grade_level")
                .and_then(|v| match FeatureKind::GradeLevel.read(v) {
                    Reading::Value(level) => Some(level),
                    _ => None,
                }),
        };
        level.and_then(GradeBand::from_grade_level)
    }
}

fn finite_f32(value: f64) -> Result<f32, DefaultReason> {
    let narrowed = value as f32;
    if narrowed.is_finite() {
        Ok(narrowed)
    } else {
        Err(DefaultReason::Invalid {
            raw: value.to_string(),
        })
    }
}

/// Try each source in priority order.
///
/// An invalid value does not stop the search; a later source may still
/// succeed. If none does, the first invalid value is reported.
fn resolve(spec: &FeatureSpec, record: &StudentRecord) -> Result<f64, DefaultReason> {
    let mut first_invalid: Option<String> = None;

    for source in &spec.sources {
        let reading = match source {
            FeatureSource::Field { aliases } => read_aliases(&spec.kind, record, aliases),
            FeatureSource::MeanOf { patterns, exclude } => mean_of(&spec.kind, record, patterns, exclude),
            FeatureSource::Ratio {
                numerator,
                denominator,
            } => ratio(record, numerator, denominator),
            FeatureSource::CountOf { patterns, exclude } => count_missing(record, patterns, exclude),
        };

        match reading {
            Reading::Value(v) => return Ok(v),
            Reading::Invalid(raw) => {
                first_invalid.get_or_insert(raw);
            }
            Reading::Missing => {}
        }
    }

    Err(match first_invalid {
        Some(raw) => DefaultReason::Invalid { raw },
        None => DefaultReason::Missing,
    })
}

fn read_aliases(kind: &FeatureKind, record: &StudentRecord, aliases: &[String]) -> Reading {
    let mut first_invalid = None;
    for alias in aliases {
        let Some(raw) = record.get(alias) else { continue };
        match kind.read(raw) {
            Reading::Value(v) => return Reading::Value(v),
            Reading::Invalid(raw) => {
                first_invalid.get_or_insert(raw);
            }
            Reading::Missing => {}
        }
    }
    first_invalid.map(Reading::Invalid).unwrap_or(Reading::Missing)
}

fn matching_fields<'a>(
    record: &'a StudentRecord,
    patterns: &'a [String],
    exclude: &'a [String],
) -> impl Iterator<Item = &'a FieldValue> + 'a {
    record
        .fields()
        .filter(move |(key, _)| key_matches(key, patterns) && !key_matches(key, exclude))
        .map(|(_, value)| value)
}

fn mean_of(kind: &FeatureKind, record: &StudentRecord, patterns: &[String], exclude: &[String]) -> Reading {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in matching_fields(record, patterns, exclude) {
        if let Reading::Value(v) = kind.read(value) {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        Reading::Missing
    } else {
        Reading::Value(sum / count as f64)
    }
}

fn ratio(record: &StudentRecord, numerator: &[String], denominator: &[String]) -> Reading {
    let first_number = |aliases: &[String]| {
        aliases
            .iter()
            .filter_map(|alias| record.get(alias))
            .find_map(FieldValue::as_number)
    };

    match (first_number(numerator), first_number(denominator)) {
        (Some(num), Some(den)) if den > 0.0 && num >= 0.0 && num <= den => Reading::Value(num / den),
        (Some(num), Some(den)) => Reading::Invalid(format!("{}/{}", num, den)),
        _ => Reading::Missing,
    }
}

fn count_missing(record: &StudentRecord, patterns: &[String], exclude: &[String]) -> Reading {
    let mut seen = 0usize;
    let mut missing = 0usize;
    for value in matching_fields(record, patterns, exclude) {
        seen += 1;
        let flagged = match value {
            FieldValue::Missing => true,
            FieldValue::Text(s) => s.eq_ignore_ascii_case("missing") || s.eq_ignore_ascii_case("msg"),
            FieldValue::Number(_) => false,
        };
        if flagged {
            missing += 1;
        }
    }
    if seen == 0 {
        Reading::Missing
    } else {
        Reading::Value(missing as f64)
    }
}
