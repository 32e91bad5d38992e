//! Feature catalog: how each model feature is found in a raw record
//!
//! The catalog is configuration data. Artifacts may ship their own entries
//! in the manifest; anything they do not override comes from
//! [`FeatureCatalog::standard`].

use crate::models::{normalize_key, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction in which a feature pushes risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    HigherIsProtective,
    HigherIsRisk,
    /// Background attributes; never reported as risk or protective factors
    Neutral,
}

impl Polarity {
    pub fn sign(&self) -> f64 {
        match self {
            Polarity::HigherIsProtective => 1.0,
            Polarity::HigherIsRisk => -1.0,
            Polarity::Neutral => 0.0,
        }
    }
}

/// Broad area a feature belongs to, used to pick interventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorDomain {
    Academic,
    Attendance,
    Engagement,
    Behavior,
    Background,
}

impl FactorDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorDomain::Academic => "academic",
            FactorDomain::Attendance => "attendance",
            FactorDomain::Engagement => "engagement",
            FactorDomain::Behavior => "behavior",
            FactorDomain::Background => "background",
        }
    }
}

/// Value convention and validity rule for a feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Non-negative count
    Count,
    /// Fraction in [0,1]; (1,100] is read as a percentage
    Rate,
    /// Percentage score in [0,100]; letter grades accepted
    Score,
    /// Grade point average on a 4.0 scale. Weighted values in (4,5] cap at
    /// 4.0; [10,100] is read as a percentage
    Gpa,
    /// Yes/no attribute encoded as 1/0
    Flag,
    /// Grade level with K = 0 and PK = -1
    GradeLevel,
    /// Text label encoded through a lookup table
    Categorical {
        levels: BTreeMap<String, f64>,
        neutral: f64,
    },
    /// Arbitrary numeric range check
    Bounded { min: f64, max: f64 },
}

/// Outcome of reading one raw value under a feature kind
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Value(f64),
    Missing,
    Invalid(String),
}

impl FeatureKind {
    /// Interpret a raw value, rejecting anything outside the kind's range
    pub fn read(&self, raw: &FieldValue) -> Reading {
        if raw.is_missing() {
            return Reading::Missing;
        }
        let invalid = || Reading::Invalid(raw.to_string());

        match self {
            FeatureKind::Count => match raw.as_number() {
                Some(v) if v >= 0.0 => Reading::Value(v),
                _ => invalid(),
            },
            FeatureKind::Rate => match raw.as_number() {
                Some(v) if (0.0..=1.0).contains(&v) => Reading::Value(v),
                Some(v) if v > 1.0 && v <= 100.0 => Reading::Value(v / 100.0),
                _ => invalid(),
            },
            FeatureKind::Score => match raw.as_number().or_else(|| raw.as_text().and_then(letter_grade)) {
                Some(v) if (0.0..=100.0).contains(&v) => Reading::Value(v),
                _ => invalid(),
            },
            FeatureKind::Gpa => match raw.as_number() {
                Some(v) if (0.0..=4.0).contains(&v) => Reading::Value(v),
                Some(v) if v > 4.0 && v <= 5.0 => Reading::Value(4.0),
                Some(v) if (10.0..=100.0).contains(&v) => Reading::Value(v / 25.0),
                _ => invalid(),
            },
            FeatureKind::Flag => match raw {
                FieldValue::Number(v) if *v == 0.0 || *v == 1.0 => Reading::Value(*v),
                FieldValue::Text(s) => match normalize_key(s).as_str() {
                    "yes" | "y" | "true" | "t" | "1" => Reading::Value(1.0),
                    "no" | "n" | "false" | "f" | "0" => Reading::Value(0.0),
                    _ => invalid(),
                },
                _ => invalid(),
            },
            FeatureKind::GradeLevel => {
                let level = raw.as_number().or_else(|| {
                    raw.as_text().and_then(|s| match normalize_key(s).as_str() {
                        "k" | "kg" | "kindergarten" => Some(0.0),
                        "pk" | "prek" | "pre_k" => Some(-1.0),
                        other => other.trim_end_matches(|c: char| c.is_ascii_alphabetic()).parse().ok(),
                    })
                });
                match level {
                    Some(v) if (-1.0..=12.0).contains(&v) => Reading::Value(v),
                    _ => invalid(),
                }
            }
            FeatureKind::Categorical { levels, .. } => {
                let by_label = raw.as_text().and_then(|s| levels.get(&normalize_key(s)).copied());
                let by_id = raw
                    .as_number()
                    .filter(|v| levels.values().any(|id| id == v));
                match by_label.or(by_id) {
                    Some(v) => Reading::Value(v),
                    None => invalid(),
                }
            }
            FeatureKind::Bounded { min, max } => match raw.as_number() {
                Some(v) if v >= *min && v <= *max => Reading::Value(v),
                _ => invalid(),
            },
        }
    }
}

/// Midpoint percentage for a letter grade
fn letter_grade(text: &str) -> Option<f64> {
    let score = match text.trim().to_ascii_uppercase().as_str() {
        "A+" => 98.0,
        "A" => 95.0,
        "A-" => 91.0,
        "B+" => 88.0,
        "B" => 85.0,
        "B-" => 81.0,
        "C+" => 78.0,
        "C" => 75.0,
        "C-" => 71.0,
        "D+" => 68.0,
        "D" => 65.0,
        "D-" => 61.0,
        "F" | "E" => 50.0,
        _ => return None,
    };
    Some(score)
}

/// Where a feature's raw value comes from, tried in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureSource {
    /// First present alias wins
    Field { aliases: Vec<String> },
    /// Mean of all fields whose key matches a pattern
    MeanOf {
        patterns: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
    /// numerator / denominator, e.g. days present over days enrolled
    Ratio {
        numerator: Vec<String>,
        denominator: Vec<String>,
    },
    /// Number of matching fields whose value is missing
    CountOf {
        patterns: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

impl FeatureSource {
    pub fn field(aliases: &[&str]) -> Self {
        FeatureSource::Field {
            aliases: owned(aliases),
        }
    }
}

/// True when any `_`-separated segment of `key` starts with a pattern
pub fn key_matches(key: &str, patterns: &[String]) -> bool {
    key.split('_')
        .any(|segment| patterns.iter().any(|p| !p.is_empty() && segment.starts_with(p.as_str())))
}

/// Everything the pipeline knows about one model feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub label: String,
    pub kind: FeatureKind,
    pub sources: Vec<FeatureSource>,
    /// Substituted when the record has no usable value
    pub default: f64,
    /// Typical value; deviations from it drive explanations
    pub reference: f64,
    /// Deviation that counts as one full unit in explanations
    pub spread: f64,
    pub polarity: Polarity,
    pub domain: FactorDomain,
}

impl FeatureSpec {
    /// Value substituted for missing or invalid input
    pub fn fallback_value(&self) -> f64 {
        match &self.kind {
            FeatureKind::Categorical { neutral, .. } => *neutral,
            _ => self.default,
        }
    }

    /// Signed, spread-normalised distance from the reference value.
    ///
    /// Positive means protective, negative means risk. Clamped to [-1, 1].
    pub fn normalized_deviation(&self, value: f64) -> f64 {
        if !value.is_finite() || self.spread <= 0.0 || !self.spread.is_finite() {
            return 0.0;
        }
        (self.polarity.sign() * (value - self.reference) / self.spread).clamp(-1.0, 1.0)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("feature with empty name".to_string());
        }
        if !self.default.is_finite() || !self.reference.is_finite() {
            return Err(format!("feature {} has a non-finite default or reference", self.name));
        }
        if !(self.spread.is_finite() && self.spread > 0.0) {
            return Err(format!("feature {} must have a positive spread", self.name));
        }
        Ok(())
    }
}

/// Ordered collection of feature specs, looked up by name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureCatalog {
    specs: Vec<FeatureSpec>,
}

impl FeatureCatalog {
    pub fn from_specs(specs: Vec<FeatureSpec>) -> Result<Self, String> {
        for spec in &specs {
            spec.validate()?;
        }
        Ok(Self { specs })
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Overlay `overrides` on this catalog; entries with the same name replace
    pub fn merged_with(&self, overrides: &FeatureCatalog) -> Result<Self, String> {
        let mut specs = self.specs.clone();
        for spec in &overrides.specs {
            spec.validate()?;
            match specs.iter_mut().find(|s| s.name == spec.name) {
                Some(existing) => *existing = spec.clone(),
                None => specs.push(spec.clone()),
            }
        }
        Ok(Self { specs })
    }

    /// Built-in catalog for common gradebook, SIS and LMS exports
    pub fn standard() -> Self {
        let assessment = owned(&[
            "quiz", "assignment", "homework", "hw", "exam", "test", "assessment", "midterm",
            "project", "essay",
        ]);
        let not_a_score = owned(&[
            "missing", "late", "count", "total", "num", "rate", "avg", "average", "completion",
            "submission", "submitted", "pct", "percent", "weight",
        ]);

        let specs = vec![
            FeatureSpec {
                name: "gpa".into(),
                label: "GPA".into(),
                kind: FeatureKind::Gpa,
                sources: vec![FeatureSource::field(&[
                    "gpa",
                    "cumulative_gpa",
                    "current_gpa",
                    "term_gpa",
                    "gpa_4_0",
                    "unweighted_gpa",
                    "weighted_gpa",
                ])],
                default: 2.8,
                reference: 2.8,
                spread: 2.0,
                polarity: Polarity::HigherIsProtective,
                domain: FactorDomain::Academic,
            },
            FeatureSpec {
                name: "attendance_rate".into(),
                label: "Attendance rate".into(),
                kind: FeatureKind::Rate,
                sources: vec![
                    FeatureSource::field(&[
                        "attendance_rate",
                        "attendance",
                        "attendance_pct",
                        "attendance_percent",
                        "percent_present",
                        "ada",
                    ]),
                    FeatureSource::Ratio {
                        numerator: owned(&["days_present", "present_days", "days_attended"]),
                        denominator: owned(&["days_enrolled", "enrolled_days", "days_in_session", "total_days"]),
                    },
                ],
                default: 0.92,
                reference: 0.92,
                spread: 0.2,
                polarity: Polarity::HigherIsProtective,
                domain: FactorDomain::Attendance,
            },
            FeatureSpec {
                name: "early_avg_score".into(),
                label: "Early assessment average".into(),
                kind: FeatureKind::Score,
                sources: vec![
                    FeatureSource::field(&["early_avg_score", "early_average", "early_assessment_avg"]),
                    FeatureSource::MeanOf {
                        patterns: assessment.clone(),
                        exclude: not_a_score.clone(),
                    },
                ],
                default: 76.0,
                reference: 76.0,
                spread: 40.0,
                polarity: Polarity::HigherIsProtective,
                domain: FactorDomain::Academic,
            },
            FeatureSpec {
                name: "current_score".into(),
                label: "Current course score".into(),
                kind: FeatureKind::Score,
                sources: vec![FeatureSource::field(&[
                    "current_score",
                    "unposted_current_score",
                    "current_grade",
                    "final_score",
                    "unposted_final_score",
                    "course_grade",
                    "grade_percent",
                ])],
                default: 76.0,
                reference: 76.0,
                spread: 40.0,
                polarity: Polarity::HigherIsProtective,
                domain: FactorDomain::Academic,
            },
            FeatureSpec {
                name: "missing_assignments".into(),
                label: "Missing assignments".into(),
                kind: FeatureKind::Count,
                sources: vec![
                    FeatureSource::field(&[
                        "missing_assignments",
                        "missing_assignment_count",
                        "assignments_missing",
                        "num_missing",
                    ]),
                    FeatureSource::CountOf {
                        patterns: assessment.clone(),
                        exclude: not_a_score.clone(),
                    },
                ],
                default: 0.0,
                reference: 0.0,
                spread: 10.0,
                polarity: Polarity::HigherIsRisk,
                domain: FactorDomain::Engagement,
            },
            FeatureSpec {
                name: "late_submissions".into(),
                label: "Late submissions".into(),
                kind: FeatureKind::Count,
                sources: vec![FeatureSource::field(&[
                    "late_submissions",
                    "late_assignments",
                    "late_count",
                    "num_late",
                ])],
                default: 0.0,
                reference: 0.0,
                spread: 10.0,
                polarity: Polarity::HigherIsRisk,
                domain: FactorDomain::Engagement,
            },
            FeatureSpec {
                name: "assignment_completion_rate".into(),
                label: "Assignment completion rate".into(),
                kind: FeatureKind::Rate,
                sources: vec![FeatureSource::field(&[
                    "assignment_completion_rate",
                    "completion_rate",
                    "submission_rate",
                ])],
                default: 0.85,
                reference: 0.85,
                spread: 0.3,
                polarity: Polarity::HigherIsProtective,
                domain: FactorDomain::Engagement,
            },
            FeatureSpec {
                name: "course_failures".into(),
                label: "Course failures".into(),
                kind: FeatureKind::Count,
                sources: vec![FeatureSource::field(&[
                    "course_failures",
                    "failed_courses",
                    "courses_failed",
                    "failures",
                ])],
                default: 0.0,
                reference: 0.0,
                spread: 3.0,
                polarity: Polarity::HigherIsRisk,
                domain: FactorDomain::Academic,
            },
            FeatureSpec {
                name: "discipline_incidents".into(),
                label: "Discipline incidents".into(),
                kind: FeatureKind::Count,
                sources: vec![FeatureSource::field(&[
                    "discipline_incidents",
                    "disciplinary_incidents",
                    "behavior_incidents",
                    "referrals",
                    "office_referrals",
                ])],
                default: 0.0,
                reference: 0.0,
                spread: 5.0,
                polarity: Polarity::HigherIsRisk,
                domain: FactorDomain::Behavior,
            },
            FeatureSpec {
                name: "lms_logins_per_week".into(),
                label: "LMS logins per week".into(),
                kind: FeatureKind::Count,
                sources: vec![FeatureSource::field(&[
                    "lms_logins_per_week",
                    "logins_per_week",
                    "weekly_logins",
                    "avg_weekly_logins",
                ])],
                // activity rates impute the population mean, not zero
                default: 4.0,
                reference: 4.0,
                spread: 8.0,
                polarity: Polarity::HigherIsProtective,
                domain: FactorDomain::Engagement,
            },
            FeatureSpec {
                name: "grade_level".into(),
                label: "Grade level".into(),
                kind: FeatureKind::GradeLevel,
                sources: vec![FeatureSource::field(&["grade_level", "current_grade_level", "year_level", "grade_lvl"])],
                default: 9.0,
                reference: 9.0,
                spread: 12.0,
                polarity: Polarity::Neutral,
                domain: FactorDomain::Background,
            },
            FeatureSpec {
                name: "ell_status".into(),
                label: "English learner".into(),
                kind: FeatureKind::Flag,
                sources: vec![FeatureSource::field(&["ell_status", "ell", "english_learner", "esl"])],
                default: 0.0,
                reference: 0.0,
                spread: 1.0,
                polarity: Polarity::Neutral,
                domain: FactorDomain::Background,
            },
            FeatureSpec {
                name: "iep_status".into(),
                label: "IEP".into(),
                kind: FeatureKind::Flag,
                sources: vec![FeatureSource::field(&["iep_status", "iep", "special_education", "sped"])],
                default: 0.0,
                reference: 0.0,
                spread: 1.0,
                polarity: Polarity::Neutral,
                domain: FactorDomain::Background,
            },
            FeatureSpec {
                name: "lunch_status".into(),
                label: "Meal program status".into(),
                kind: FeatureKind::Categorical {
                    levels: [("paid", 0.0), ("reduced", 1.0), ("free", 2.0)]
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                    neutral: 0.0,
                },
                sources: vec![FeatureSource::field(&["lunch_status", "meal_status", "frl_status"])],
                default: 0.0,
                reference: 0.0,
                spread: 2.0,
                polarity: Polarity::Neutral,
                domain: FactorDomain::Background,
            },
        ];

        Self { specs }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
