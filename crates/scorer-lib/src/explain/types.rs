//! Explanation types returned to callers

use crate::features::FactorDomain;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far a risk factor sits from its reference value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorSeverity {
    Low,
    Moderate,
    High,
}

impl FactorSeverity {
    /// Bucket a normalised deviation magnitude: `< 0.3` low, `< 0.6` moderate
    pub fn from_deviation(deviation: f64) -> Self {
        let magnitude = deviation.abs();
        if magnitude >= 0.6 {
            FactorSeverity::High
        } else if magnitude >= 0.3 {
            FactorSeverity::Moderate
        } else {
            FactorSeverity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FactorSeverity::Low => "low",
            FactorSeverity::Moderate => "moderate",
            FactorSeverity::High => "high",
        }
    }
}

impl fmt::Display for FactorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether contributions were weighted by the artifact's importances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceSource {
    Model,
    /// Importances absent or malformed; ranked by raw deviation
    DeviationOnly,
}

/// Coarse reading of the numeric confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Moderate,
    High,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.7 {
            ConfidenceLevel::High
        } else if confidence >= 0.4 {
            ConfidenceLevel::Moderate
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Moderate => "moderate",
            ConfidenceLevel::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feature pushing the student toward failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub feature: String,
    pub label: String,
    pub domain: FactorDomain,
    pub severity: FactorSeverity,
    pub value: f64,
    pub deviation: f64,
    /// Always negative
    pub contribution: f64,
}

/// A feature associated with reduced risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectiveFactor {
    pub feature: String,
    pub label: String,
    pub domain: FactorDomain,
    pub value: f64,
    pub deviation: f64,
    /// Always positive
    pub contribution: f64,
}

/// Ranked explanation of one risk result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub student_id: String,
    pub model_version: String,
    pub risk_factors: Vec<RiskFactor>,
    pub protective_factors: Vec<ProtectiveFactor>,
    pub narrative_confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub confidence_statement: String,
    /// Why the result should not be trusted on its own, if it is low confidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caveat: Option<String>,
    pub importance_source: ImportanceSource,
}

impl Explanation {
    /// Domain of the highest-ranked risk factor
    pub fn dominant_domain(&self) -> Option<FactorDomain> {
        self.risk_factors.first().map(|f| f.domain)
    }
}
