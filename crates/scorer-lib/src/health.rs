//! Liveness and readiness for the risk scorer
//!
//! The `model` component mirrors the predictor lifecycle. A degraded
//! predictor is operational: it still answers every request from the
//! heuristic, so it reports `degraded` rather than `unhealthy`.

use crate::predictor::{PredictorState, RiskPredictor};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Answering, but not from a trained model
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub predictor_state: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const MODEL: &str = "model";
}

#[derive(Debug)]
struct Snapshot {
    state: PredictorState,
    model: ComponentHealth,
    ready: bool,
}

/// Shared view of the predictor lifecycle for the probe endpoints
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    inner: Arc<RwLock<Snapshot>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        let model = ComponentHealth::new(
            ComponentStatus::Unhealthy,
            Some("predictor not initialized".to_string()),
        );
        Self {
            inner: Arc::new(RwLock::new(Snapshot {
                state: PredictorState::Uninitialized,
                model,
                ready: false,
            })),
        }
    }

    /// Artifact loading from `model_dir` has started
    pub async fn report_loading(&self, model_dir: &Path) {
        let mut inner = self.inner.write().await;
        inner.state = PredictorState::Loading;
        inner.model = ComponentHealth::new(
            ComponentStatus::Unhealthy,
            Some(format!("loading model artifacts from {}", model_dir.display())),
        );
    }

    /// Reflect the predictor's state on the model component
    pub async fn report_predictor(&self, predictor: &RiskPredictor) {
        let state = predictor.state();
        let model = match state {
            PredictorState::Ready => ComponentHealth::new(
                ComponentStatus::Healthy,
                Some(predictor.model_versions().join(", ")),
            ),
            PredictorState::Degraded => ComponentHealth::new(
                ComponentStatus::Degraded,
                Some(
                    predictor
                        .degraded_reason()
                        .unwrap_or("model artifacts unavailable")
                        .to_string(),
                ),
            ),
            PredictorState::Uninitialized | PredictorState::Loading => ComponentHealth::new(
                ComponentStatus::Unhealthy,
                Some(format!("predictor is {}", state)),
            ),
        };

        let mut inner = self.inner.write().await;
        inner.state = state;
        inner.model = model;
    }

    /// Set once startup loading has finished
    pub async fn set_ready(&self, ready: bool) {
        self.inner.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let inner = self.inner.read().await;
        let mut components = BTreeMap::new();
        components.insert(components::MODEL.to_string(), inner.model.clone());
        HealthResponse {
            status: inner.model.status,
            predictor_state: inner.state.as_str().to_string(),
            components,
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let inner = self.inner.read().await;
        let reason = if !inner.ready {
            Some("Model artifacts not yet loaded".to_string())
        } else if inner.model.status == ComponentStatus::Unhealthy {
            Some(format!("Predictor is {}", inner.state))
        } else {
            None
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
