//! Shared fixtures for predictor, explainer and pipeline tests

use super::{ModelArtifact, PredictorConfig, RiskPredictor};
use std::path::Path;

pub(crate) const HIGH_SCHOOL_MANIFEST: &str = include_str!("../../../../models/high/manifest.json");
pub(crate) const MIDDLE_SCHOOL_MANIFEST: &str = include_str!("../../../../models/middle/manifest.json");

pub(crate) fn high_school_artifact() -> ModelArtifact {
    ModelArtifact::from_manifest_str(HIGH_SCHOOL_MANIFEST, Path::new("models/high"))
        .expect("demo high school manifest is valid")
}

pub(crate) fn middle_school_artifact() -> ModelArtifact {
    ModelArtifact::from_manifest_str(MIDDLE_SCHOOL_MANIFEST, Path::new("models/middle"))
        .expect("demo middle school manifest is valid")
}

pub(crate) fn ready_predictor() -> RiskPredictor {
    RiskPredictor::with_artifacts(
        vec![high_school_artifact(), middle_school_artifact()],
        PredictorConfig::default(),
    )
}

pub(crate) fn degraded_predictor() -> RiskPredictor {
    RiskPredictor::degraded("failed to read models/manifest.json: No such file or directory")
}
