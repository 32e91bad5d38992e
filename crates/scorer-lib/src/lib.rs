//! Scoring library for the early-warning risk pipeline
//!
//! This crate provides the core functionality for:
//! - Normalising loosely-typed gradebook/LMS records
//! - Feature engineering against a per-model catalog
//! - Model artifact loading and risk prediction with heuristic fallback
//! - Explanations and intervention suggestions
//! - Health checks and observability

pub mod advisor;
pub mod error;
pub mod explain;
pub mod features;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;

pub use advisor::{InterventionAdvisor, InterventionCategory};
pub use error::{ArtifactError, PredictionError, RecordError};
pub use explain::{ExplainConfig, Explanation, ExplanationEngine};
pub use features::{FeatureCatalog, FeatureEngineer};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScorerMetrics, StructuredLogger};
pub use pipeline::{Assessment, EarlyWarningPipeline, PipelineConfig};
pub use predictor::{PredictorConfig, PredictorState, RiskPredictor};
