//! Error taxonomy for the scoring core
//!
//! Record-level input problems are never errors once a `StudentRecord`
//! exists; they surface as `DefaultedFeature` diagnostics instead.

use crate::models::FallbackReason;
use std::path::PathBuf;
use thiserror::Error;

/// Rejection of a raw row before it becomes a `StudentRecord`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record has no recognised student identifier")]
    MissingStudentId,
    #[error("record is not a JSON object")]
    NotAnObject,
}

/// Failure to load a model artifact at startup
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("failed to load inference backend: {0:#}")]
    Backend(anyhow::Error),

    #[error("no model artifacts found under {}", .0.display())]
    NotFound(PathBuf),
}

/// Failure of a single model prediction
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("model unavailable: predictor is running in degraded mode")]
    ModelUnavailable,

    #[error("schema mismatch: model expects {expected} features, vector has {actual}{}", detail_suffix(.first_difference))]
    SchemaMismatch {
        expected: usize,
        actual: usize,
        first_difference: Option<String>,
    },

    #[error("inference backend failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("classifier returned invalid probability {0}")]
    InvalidProbability(f64),
}

impl PredictionError {
    /// Tag recorded on the fallback result that replaces this failure
    pub fn fallback_reason(&self) -> FallbackReason {
        match self {
            PredictionError::ModelUnavailable => FallbackReason::ModelUnavailable,
            PredictionError::SchemaMismatch { .. } => FallbackReason::SchemaMismatch,
            PredictionError::Inference(_) => FallbackReason::InferenceFailed,
            PredictionError::InvalidProbability(_) => FallbackReason::InvalidOutput,
        }
    }
}

fn detail_suffix(first_difference: &Option<String>) -> String {
    match first_difference {
        Some(detail) => format!(" ({})", detail),
        None => String::new(),
    }
}
