//! Model health endpoint integration tests
//!
//! Tests for health feedback:
//! - POST /v1/models/:model/failure
//! - POST /v1/models/:model/success
//! - GET /v1/models/health

use axum::http::StatusCode;
use costroute::routes::models::{ModelHealthList, ModelHealthReport};
use costroute::routes::route::RouteResponse;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{models, TestHarness};

const DEEPSEEK_PATH: &str = "deepseek%2Fdeepseek-chat";

#[tokio::test]
async fn test_failure_puts_model_in_backoff() {
    let harness = TestHarness::reference();

    let response = harness
        .server
        .post(&format!("/v1/models/{}/failure", DEEPSEEK_PATH))
        .await;

    response.assert_status_ok();
    let report: ModelHealthReport = response.json();
    assert_eq!(report.model, models::DEEPSEEK);
    assert!(!report.available);
    assert!(report.backoff_remaining_secs > 0);
    assert!(report.backoff_remaining_secs <= 30);

    let response = harness.server.get("/v1/models/health").await;
    response.assert_status_ok();
    let list: ModelHealthList = response.json();
    assert_eq!(list.unavailable.len(), 1);
    assert_eq!(list.unavailable[0].model, models::DEEPSEEK);
    assert_eq!(list.unavailable[0].consecutive_failures, 1);
}

#[tokio::test]
async fn test_routing_skips_failed_model_until_success() {
    let harness = TestHarness::reference();

    harness
        .server
        .post(&format!("/v1/models/{}/failure", DEEPSEEK_PATH))
        .await
        .assert_status_ok();

    let routed: RouteResponse = harness
        .server
        .post("/v1/route")
        .json(&json!({ "intent": "general" }))
        .await
        .json();
    assert_eq!(routed.decision.selected_model, models::GROQ);

    let response = harness
        .server
        .post(&format!("/v1/models/{}/success", DEEPSEEK_PATH))
        .await;
    response.assert_status_ok();
    let report: ModelHealthReport = response.json();
    assert!(report.available);
    assert_eq!(report.backoff_remaining_secs, 0);

    let routed: RouteResponse = harness
        .server
        .post("/v1/route")
        .json(&json!({ "intent": "general" }))
        .await
        .json();
    assert_eq!(routed.decision.selected_model, models::DEEPSEEK);
}

#[tokio::test]
async fn test_repeated_failures_grow_backoff() {
    let harness = TestHarness::reference();

    for _ in 0..3 {
        harness
            .server
            .post(&format!("/v1/models/{}/failure", DEEPSEEK_PATH))
            .await
            .assert_status_ok();
    }

    let list: ModelHealthList = harness.server.get("/v1/models/health").await.json();
    assert_eq!(list.unavailable[0].consecutive_failures, 3);
    // 30s * 2^2
    assert!(list.unavailable[0].backoff_remaining_secs > 60);
    assert!(list.unavailable[0].backoff_remaining_secs <= 120);
}

#[tokio::test]
async fn test_no_models_in_backoff_initially() {
    let harness = TestHarness::reference();

    let list: ModelHealthList = harness.server.get("/v1/models/health").await.json();

    assert!(list.unavailable.is_empty());
}

#[tokio::test]
async fn test_unknown_model_is_not_tracked() {
    let harness = TestHarness::reference();

    for i in 0..20 {
        let response = harness
            .server
            .post(&format!("/v1/models/not-a-model-{}/failure", i))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let json: Value = response.json();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    harness
        .server
        .post("/v1/models/not-a-model/success")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let list: ModelHealthList = harness.server.get("/v1/models/health").await.json();
    assert!(list.unavailable.is_empty());
}
