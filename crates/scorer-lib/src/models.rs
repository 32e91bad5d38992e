//! Core data models for the risk scorer

use crate::error::RecordError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Keys accepted as the student identifier, in priority order
pub const STUDENT_ID_ALIASES: &[&str] = &[
    "student_id",
    "studentid",
    "sis_user_id",
    "sis_id",
    "user_id",
    "id",
];

/// Text placeholders that gradebook exports use for "no value"
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "null", "none", "-", "--"];

/// A single raw value from a gradebook or LMS export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    /// Build a value from free text, mapping export placeholders to `Missing`
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if MISSING_MARKERS.contains(&trimmed.to_ascii_lowercase().as_str()) {
            FieldValue::Missing
        } else {
            FieldValue::Text(trimmed.to_string())
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Missing,
            serde_json::Value::Bool(b) => FieldValue::Number(if *b { 1.0 } else { 0.0 }),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(v) if v.is_finite() => FieldValue::Number(v),
                _ => FieldValue::Missing,
            },
            serde_json::Value::String(s) => FieldValue::from_text(s),
            // Nested structures are not gradebook cells
            _ => FieldValue::Missing,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// Numeric reading of the value, tolerating `85%` and `1,234` text forms
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) if v.is_finite() => Some(*v),
            FieldValue::Number(_) | FieldValue::Missing => None,
            FieldValue::Text(s) => {
                let cleaned: String = s
                    .trim()
                    .trim_end_matches('%')
                    .chars()
                    .filter(|c| *c != ',' && !c.is_whitespace())
                    .collect();
                cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Missing => write!(f, "<missing>"),
        }
    }
}

/// Normalise a column header so export conventions compare equal.
///
/// `"Current Score"`, `"current-score"` and `"CURRENT_SCORE"` all become
/// `"current_score"`.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// A heterogeneous student row keyed by normalised field name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    student_id: String,
    fields: BTreeMap<String, FieldValue>,
}

impl StudentRecord {
    /// Build a record from raw `(key, value)` pairs.
    ///
    /// Keys are normalised; the first non-empty identifier alias becomes the
    /// student id. A record without an identifier is the only rejected input.
    pub fn from_fields<I, K>(fields: I) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: AsRef<str>,
    {
        let mut map = BTreeMap::new();
        for (key, value) in fields {
            let key = normalize_key(key.as_ref());
            if key.is_empty() {
                continue;
            }
            map.insert(key, value);
        }

        let student_id = STUDENT_ID_ALIASES
            .iter()
            .filter_map(|alias| map.get(*alias))
            .find_map(render_identifier)
            .ok_or(RecordError::MissingStudentId)?;

        Ok(Self {
            student_id,
            fields: map,
        })
    }

    /// Build a record from a JSON object (one row of a JSON-lines export)
    pub fn from_json(value: &serde_json::Value) -> Result<Self, RecordError> {
        let object = value.as_object().ok_or(RecordError::NotAnObject)?;
        Self::from_fields(
            object
                .iter()
                .map(|(k, v)| (k.as_str(), FieldValue::from_json(v))),
        )
    }

    /// Convenience constructor for a record with only an identifier
    pub fn with_id(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion (key is normalised)
    pub fn with_field(mut self, key: &str, value: FieldValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: FieldValue) {
        let key = normalize_key(key);
        if !key.is_empty() {
            self.fields.insert(key, value);
        }
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    /// Look up a field by (un-normalised) name
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(&normalize_key(key))
    }

    /// Iterate over normalised keys and values
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn render_identifier(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        FieldValue::Number(v) if v.is_finite() => {
            if v.fract() == 0.0 && v.abs() < 1e15 {
                Some(format!("{}", *v as i64))
            } else {
                Some(v.to_string())
            }
        }
        _ => None,
    }
}

/// Coarse schooling stage associated with a trained model variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeBand {
    Elementary,
    Middle,
    High,
}

impl GradeBand {
    /// Map a grade level (K = 0) to its band
    pub fn from_grade_level(level: f64) -> Option<Self> {
        if !level.is_finite() {
            return None;
        }
        match level.round() as i64 {
            -1..=5 => Some(GradeBand::Elementary),
            6..=8 => Some(GradeBand::Middle),
            9..=12 => Some(GradeBand::High),
            _ => None,
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match normalize_key(label).as_str() {
            "elementary" | "es" | "primary" => Some(GradeBand::Elementary),
            "middle" | "ms" | "middle_school" | "junior_high" => Some(GradeBand::Middle),
            "high" | "hs" | "high_school" | "secondary" => Some(GradeBand::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GradeBand::Elementary => "elementary",
            GradeBand::Middle => "middle",
            GradeBand::High => "high",
        }
    }
}

impl fmt::Display for GradeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-order numeric encoding of a student record.
///
/// Carries its schema so a vector built for one model cannot be silently
/// scored by another, and an `observed` mask recording which entries came
/// from the record rather than from catalog defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub student_id: String,
    pub feature_names: Arc<[String]>,
    pub values: Vec<f32>,
    pub observed: Vec<bool>,
}

impl FeatureVector {
    pub fn new(
        student_id: impl Into<String>,
        feature_names: Arc<[String]>,
        values: Vec<f32>,
        observed: Vec<bool>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            feature_names,
            values,
            observed,
        }
    }

    /// A vector whose every entry is treated as observed
    pub fn from_values(
        student_id: impl Into<String>,
        feature_names: Arc<[String]>,
        values: Vec<f32>,
    ) -> Self {
        let observed = vec![true; values.len()];
        Self::new(student_id, feature_names, values, observed)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a named feature, if present in this vector's schema
    pub fn get(&self, name: &str) -> Option<f32> {
        self.position(name).and_then(|i| self.values.get(i).copied())
    }

    pub fn is_observed(&self, name: &str) -> bool {
        self.position(name)
            .and_then(|i| self.observed.get(i).copied())
            .unwrap_or(false)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// True when every value is finite and the parallel arrays line up
    pub fn is_well_formed(&self) -> bool {
        self.values.len() == self.feature_names.len()
            && self.observed.len() == self.values.len()
            && self.values.iter().all(|v| v.is_finite())
    }
}

/// Discretisation of risk probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
}

/// Lower bound (inclusive) of the Moderate bucket
pub const MODERATE_RISK_THRESHOLD: f64 = 0.30;

/// Lower bound (inclusive) of the High bucket
pub const HIGH_RISK_THRESHOLD: f64 = 0.70;

impl RiskCategory {
    /// Bucket a risk probability. Boundaries belong to the higher-risk bucket.
    pub fn from_risk_probability(risk_probability: f64) -> Self {
        if risk_probability >= HIGH_RISK_THRESHOLD {
            RiskCategory::High
        } else if risk_probability >= MODERATE_RISK_THRESHOLD {
            RiskCategory::Moderate
        } else {
            RiskCategory::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "Low",
            RiskCategory::Moderate => "Moderate",
            RiskCategory::High => "High",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a prediction was served by the heuristic instead of the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    ModelUnavailable,
    SchemaMismatch,
    InferenceFailed,
    InvalidOutput,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::ModelUnavailable => "model_unavailable",
            FallbackReason::SchemaMismatch => "schema_mismatch",
            FallbackReason::InferenceFailed => "inference_failed",
            FallbackReason::InvalidOutput => "invalid_output",
        }
    }
}

/// Where a risk result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    Fallback { reason: FallbackReason },
}

impl PredictionSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, PredictionSource::Fallback { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PredictionSource::Model => "model",
            PredictionSource::Fallback { .. } => "fallback",
        }
    }
}

/// Risk prediction for one student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    pub student_id: String,
    pub success_probability: f64,
    pub risk_probability: f64,
    pub risk_category: RiskCategory,
    pub confidence: f64,
    pub data_coverage: f64,
    pub model_version: String,
    pub grade_band: Option<GradeBand>,
    pub source: PredictionSource,
    pub generated_at: i64,
}
