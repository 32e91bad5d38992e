//! Model artifacts
//!
//! An artifact is a directory holding `manifest.json` and, for ONNX
//! backends, the model file it names. Artifacts are loaded once at startup
//! and are immutable afterwards; every prediction reads them through a
//! shared reference.

use super::inference::{LogisticClassifier, OnnxClassifier};
use super::Classifier;
use crate::error::{ArtifactError, PredictionError};
use crate::features::FeatureCatalog;
use crate::models::GradeBand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// File name of the artifact manifest
pub const MANIFEST_FILE: &str = "manifest.json";

/// Tolerance on the importance sum
const IMPORTANCE_SUM_TOLERANCE: f64 = 1e-3;

/// Which class probability the trained artifact emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSemantics {
    #[default]
    SuccessProbability,
    RiskProbability,
}

/// Descriptive metadata of a loaded artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetadata {
    pub model_version: String,
    pub grade_band: Option<GradeBand>,
    pub trained_at: Option<DateTime<Utc>>,
    pub auc_score: Option<f64>,
    pub output: OutputSemantics,
    pub backend: &'static str,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    model_version: String,
    #[serde(default)]
    grade_band: Option<GradeBand>,
    #[serde(default)]
    trained_at: Option<DateTime<Utc>>,
    #[serde(default)]
    auc_score: Option<f64>,
    #[serde(default)]
    output: OutputSemantics,
    feature_names: Vec<String>,
    #[serde(default)]
    feature_importances: Vec<f64>,
    #[serde(default)]
    features: Option<FeatureCatalog>,
    backend: BackendSpec,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BackendSpec {
    Logistic {
        intercept: f64,
        coefficients: Vec<f64>,
        #[serde(default)]
        means: Vec<f64>,
        #[serde(default)]
        scales: Vec<f64>,
    },
    Onnx {
        file: String,
        #[serde(default)]
        sha256: Option<String>,
    },
}

/// A trained classifier with its schema, importances and feature catalog
pub struct ModelArtifact {
    metadata: ModelMetadata,
    feature_names: Arc<[String]>,
    feature_importances: Vec<f64>,
    catalog: Arc<FeatureCatalog>,
    classifier: Box<dyn Classifier>,
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("metadata", &self.metadata)
            .field("feature_names", &self.feature_names)
            .field("feature_importances", &self.feature_importances)
            .finish_non_exhaustive()
    }
}

impl ModelArtifact {
    /// Assemble an artifact from parts, validating the schema
    pub fn new(
        mut metadata: ModelMetadata,
        feature_names: Vec<String>,
        feature_importances: Vec<f64>,
        catalog: FeatureCatalog,
        classifier: Box<dyn Classifier>,
    ) -> Result<Self, ArtifactError> {
        if feature_names.is_empty() {
            return Err(ArtifactError::Invalid(format!(
                "model {} declares no features",
                metadata.model_version
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = feature_names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(ArtifactError::Invalid(format!("duplicate feature name {}", dup)));
        }
        if let Some(auc) = metadata.auc_score {
            if !(0.0..=1.0).contains(&auc) {
                return Err(ArtifactError::Invalid(format!("auc_score {} outside [0,1]", auc)));
            }
        }

        if !feature_importances.is_empty()
            && !importances_are_valid(&feature_importances, feature_names.len())
        {
            warn!(
                model_version = %metadata.model_version,
                importances = feature_importances.len(),
                features = feature_names.len(),
                "Feature importances are malformed; explanations will use deviation only"
            );
        }

        let unknown: Vec<&str> = feature_names
            .iter()
            .filter(|n| catalog.get(n).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            warn!(
                model_version = %metadata.model_version,
                features = ?unknown,
                "Features without a catalog entry will always be defaulted"
            );
        }

        metadata.backend = classifier.backend();

        Ok(Self {
            metadata,
            feature_names: feature_names.into(),
            feature_importances,
            catalog: Arc::new(catalog),
            classifier,
        })
    }

    /// Load the artifact stored in `dir`
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_manifest_str(&text, dir)
    }

    /// Build an artifact from manifest text; backend files resolve against `base_dir`
    pub fn from_manifest_str(json: &str, base_dir: &Path) -> Result<Self, ArtifactError> {
        let manifest: Manifest = serde_json::from_str(json).map_err(|source| ArtifactError::Manifest {
            path: base_dir.join(MANIFEST_FILE),
            source,
        })?;

        let num_features = manifest.feature_names.len();
        let classifier: Box<dyn Classifier> = match manifest.backend {
            BackendSpec::Logistic {
                intercept,
                coefficients,
                means,
                scales,
            } => {
                let model =
                    LogisticClassifier::new(intercept, coefficients, means, scales).map_err(ArtifactError::Backend)?;
                if model.num_features() != num_features {
                    return Err(ArtifactError::Invalid(format!(
                        "logistic backend has {} coefficients for {} features",
                        model.num_features(),
                        num_features
                    )));
                }
                Box::new(model)
            }
            BackendSpec::Onnx { file, sha256 } => {
                let model_path = base_dir.join(&file);
                let bytes = fs::read(&model_path).map_err(|source| ArtifactError::Io {
                    path: model_path.clone(),
                    source,
                })?;
                if let Some(expected) = sha256 {
                    let actual = compute_checksum(&bytes);
                    if !actual.eq_ignore_ascii_case(expected.trim()) {
                        return Err(ArtifactError::Checksum {
                            path: model_path,
                            expected,
                            actual,
                        });
                    }
                }
                Box::new(OnnxClassifier::from_bytes(&bytes, num_features).map_err(ArtifactError::Backend)?)
            }
        };

        let standard = FeatureCatalog::standard();
        let catalog = match &manifest.features {
            Some(custom) => standard.merged_with(custom).map_err(ArtifactError::Invalid)?,
            None => standard,
        };

        let metadata = ModelMetadata {
            model_version: manifest.model_version,
            grade_band: manifest.grade_band,
            trained_at: manifest.trained_at,
            auc_score: manifest.auc_score,
            output: manifest.output,
            backend: "unknown",
        };

        Self::new(
            metadata,
            manifest.feature_names,
            manifest.feature_importances,
            catalog,
            classifier,
        )
    }

    /// Load every artifact under `model_dir`.
    ///
    /// `model_dir` is either an artifact itself or a directory of artifacts
    /// (one sub-directory per grade band). Failed artifacts are returned as
    /// errors alongside the ones that loaded.
    pub fn load_dir(model_dir: &Path) -> (Vec<ModelArtifact>, Vec<ArtifactError>) {
        if model_dir.join(MANIFEST_FILE).is_file() {
            return match Self::load(model_dir) {
                Ok(artifact) => (vec![artifact], Vec::new()),
                Err(e) => (Vec::new(), vec![e]),
            };
        }

        let entries = match fs::read_dir(model_dir) {
            Ok(entries) => entries,
            Err(source) => {
                return (
                    Vec::new(),
                    vec![ArtifactError::Io {
                        path: model_dir.to_path_buf(),
                        source,
                    }],
                )
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();

        if dirs.is_empty() {
            return (Vec::new(), vec![ArtifactError::NotFound(model_dir.to_path_buf())]);
        }

        let mut artifacts = Vec::new();
        let mut errors = Vec::new();
        for dir in dirs {
            match Self::load(&dir) {
                Ok(artifact) => {
                    info!(
                        path = %dir.display(),
                        model_version = %artifact.metadata.model_version,
                        "Loaded model artifact"
                    );
                    artifacts.push(artifact);
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Skipping model artifact");
                    errors.push(e);
                }
            }
        }
        (artifacts, errors)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn model_version(&self) -> &str {
        &self.metadata.model_version
    }

    pub fn grade_band(&self) -> Option<GradeBand> {
        self.metadata.grade_band
    }

    pub fn feature_names(&self) -> &Arc<[String]> {
        &self.feature_names
    }

    /// Raw importances as shipped, possibly malformed
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Importances if they are usable for weighting
    pub fn valid_importances(&self) -> Option<&[f64]> {
        if importances_are_valid(&self.feature_importances, self.feature_names.len()) {
            Some(&self.feature_importances)
        } else {
            None
        }
    }

    pub fn catalog(&self) -> &Arc<FeatureCatalog> {
        &self.catalog
    }

    /// Probability of success for one feature row, whatever the artifact emits
    pub fn success_probability(&self, features: &[f32]) -> Result<f64, PredictionError> {
        let p = self
            .classifier
            .predict_proba(features)
            .map_err(PredictionError::Inference)?;
        if !p.is_finite() || !(-1e-6..=1.0 + 1e-6).contains(&p) {
            return Err(PredictionError::InvalidProbability(p));
        }
        let p = p.clamp(0.0, 1.0);
        Ok(match self.metadata.output {
            OutputSemantics::SuccessProbability => p,
            OutputSemantics::RiskProbability => 1.0 - p,
        })
    }
}

/// One finite, non-negative weight per feature, summing to 1
pub fn importances_are_valid(importances: &[f64], num_features: usize) -> bool {
    num_features > 0
        && importances.len() == num_features
        && importances.iter().all(|w| w.is_finite() && *w >= 0.0)
        && (importances.iter().sum::<f64>() - 1.0).abs() <= IMPORTANCE_SUM_TOLERANCE
}

/// Hex-encoded SHA-256 of a model file
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
