//! HTTP API for health checks, Prometheus metrics and scoring

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use scorer_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::ScorerMetrics,
    EarlyWarningPipeline, RiskResult, StudentRecord,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ScorerMetrics,
    pub pipeline: Arc<EarlyWarningPipeline>,
    pub max_batch_size: usize,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ScorerMetrics,
        pipeline: Arc<EarlyWarningPipeline>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            pipeline,
            max_batch_size,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // heuristic still answers
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

fn rejected(error: impl ToString) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": error.to_string() })),
    )
        .into_response()
}

/// Score one record
async fn predict(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    match StudentRecord::from_json(&body) {
        Ok(record) => Json(state.pipeline.predict_one(&record)).into_response(),
        Err(e) => rejected(e),
    }
}

/// One entry of a batch response, positionally matching the request
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum BatchItem {
    Scored(RiskResult),
    Rejected { index: usize, error: String },
}

/// Score many records; a rejected record never fails the batch
async fn predict_batch(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let records = match body {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(records)) => records,
            _ => return rejected("expected an array of records or {\"records\": [...]}"),
        },
        _ => return rejected("expected an array of records or {\"records\": [...]}"),
    };

    if records.len() > state.max_batch_size {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({
                "error": format!("batch of {} exceeds limit of {}", records.len(), state.max_batch_size)
            })),
        )
            .into_response();
    }

    let results: Vec<BatchItem> = records
        .iter()
        .enumerate()
        .map(|(index, raw)| match StudentRecord::from_json(raw) {
            Ok(record) => BatchItem::Scored(state.pipeline.predict_one(&record)),
            Err(e) => BatchItem::Rejected {
                index,
                error: e.to_string(),
            },
        })
        .collect();

    Json(json!({ "results": results })).into_response()
}

/// Score, explain and suggest interventions for one record
async fn explain(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    match StudentRecord::from_json(&body) {
        Ok(record) => Json(state.pipeline.assess(&record)).into_response(),
        Err(e) => rejected(e),
    }
}

/// Loaded model metadata and predictor state
async fn model_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let predictor = state.pipeline.predictor();
    let models: Vec<_> = predictor
        .artifacts()
        .iter()
        .map(|a| {
            json!({
                "metadata": a.metadata(),
                "features": a.feature_names().as_ref(),
            })
        })
        .collect();

    Json(json!({
        "state": predictor.state().as_str(),
        "degraded_reason": predictor.degraded_reason(),
        "models": models,
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/model", get(model_info))
        .route("/v1/predict", post(predict))
        .route("/v1/predict/batch", post(predict_batch))
        .route("/v1/explain", post(explain))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
