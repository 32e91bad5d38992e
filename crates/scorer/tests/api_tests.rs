//! Integration tests for the scorer API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use risk_scorer::api::{create_router, AppState};
use scorer_lib::{
    health::HealthRegistry,
    observability::ScorerMetrics,
    EarlyWarningPipeline, PipelineConfig, RiskPredictor,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

fn demo_models() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models")
}

async fn setup_app(pipeline: EarlyWarningPipeline) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.report_predictor(pipeline.predictor()).await;

    let metrics = ScorerMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics, Arc::new(pipeline), 3));
    let router = create_router(state.clone());

    (router, state)
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let (pipeline, errors) = EarlyWarningPipeline::load(&demo_models(), PipelineConfig::default());
    assert!(errors.is_empty(), "{:?}", errors);
    setup_app(pipeline).await
}

async fn setup_degraded_app() -> (Router, Arc<AppState>) {
    let pipeline = EarlyWarningPipeline::new(
        RiskPredictor::degraded("no model artifacts found under /srv/models"),
        Default::default(),
    );
    setup_app(pipeline).await
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_healthz_returns_ok_when_model_loaded() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["predictor_state"], "ready");
    assert_eq!(health["components"]["model"]["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, _state) = setup_degraded_app().await;

    let (status, body) = get(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert!(health["components"]["model"]["message"]
        .as_str()
        .unwrap()
        .contains("/srv/models"));
}

#[tokio::test]
async fn test_healthz_returns_503_while_loading() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .report_loading(Path::new("/srv/models"))
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["predictor_state"], "loading");
}

#[tokio::test]
async fn test_readyz_follows_startup() {
    let (app, state) = setup_test_app().await;

    // not ready until startup loading finished
    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_predict_returns_risk_result() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = post_json(
        app,
        "/v1/predict",
        json!({"student_id": "s-100", "gpa": 1.8, "attendance_rate": 0.75}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["student_id"], "s-100");
    assert_eq!(body["risk_category"], "High");
    assert_eq!(body["source"]["kind"], "model");
    let success = body["success_probability"].as_f64().unwrap();
    let risk = body["risk_probability"].as_f64().unwrap();
    assert!((success + risk - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_predict_rejects_record_without_id() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = post_json(app, "/v1/predict", json!({"gpa": 3.1})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("student identifier"));
}

#[tokio::test]
async fn test_batch_preserves_order_and_isolates_bad_records() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = post_json(
        app,
        "/v1/predict/batch",
        json!({"records": [
            {"student_id": "a", "gpa": 3.9},
            {"gpa": 2.0},
            {"student_id": "c", "gpa": 1.1}
        ]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["student_id"], "a");
    assert_eq!(results[1]["index"], 1);
    assert!(results[1]["error"].is_string());
    assert_eq!(results[2]["student_id"], "c");
}

#[tokio::test]
async fn test_batch_size_limit() {
    let (app, _state) = setup_test_app().await;
    let records: Vec<Value> = (0..4).map(|i| json!({"student_id": i})).collect();

    let (status, _) = post_json(app, "/v1/predict/batch", Value::Array(records)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_explain_returns_full_assessment() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = post_json(
        app,
        "/v1/explain",
        json!({"student_id": "s-7", "gpa": 1.8, "attendance_rate": 0.75}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["student_id"], "s-7");
    assert_eq!(
        body["explanation"]["risk_factors"][0]["feature"],
        "attendance_rate"
    );
    assert_eq!(body["interventions"][0], "attendance_outreach");
    assert!(body["defaulted"].as_array().unwrap().len() >= 1);
}

#[tokio::test]
async fn test_degraded_predictions_are_tagged() {
    let (app, _state) = setup_degraded_app().await;

    let (status, body) = post_json(app, "/v1/predict", json!({"student_id": "s-1", "gpa": 3.9})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_version"], "heuristic-fallback");
    assert_eq!(body["source"]["kind"], "fallback");
    assert_eq!(body["source"]["reason"], "model_unavailable");
    assert!(body["confidence"].as_f64().unwrap() <= 0.4);
}

#[tokio::test]
async fn test_model_endpoint() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/v1/model").await;
    assert_eq!(status, StatusCode::OK);
    let info: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["state"], "ready");
    assert_eq!(info["models"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    // score something so the counters have samples
    post_json(app.clone(), "/v1/predict", json!({"student_id": "m-1", "gpa": 3.0})).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("risk_scorer_prediction_latency_seconds_bucket"));
    assert!(metrics_text.contains("risk_scorer_predictions_total"));
    assert!(metrics_text.contains("risk_scorer_model_info"));
    assert!(metrics_text.contains("risk_scorer_predictor_state"));
}
