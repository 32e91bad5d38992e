//! Explanations for risk predictions
//!
//! Ranks features by importance-weighted deviation from their reference
//! values and splits them into risk and protective factors.

mod engine;
mod types;

pub use engine::{ExplainConfig, ExplanationEngine, DEFAULT_TOP_N};
pub use types::{
    ConfidenceLevel, Explanation, FactorSeverity, ImportanceSource, ProtectiveFactor, RiskFactor,
};
