//! Usage endpoint integration tests
//!
//! Tests for usage reporting:
//! - POST /v1/usage - Fire-and-forget usage report
//! - GET /v1/usage/summary - In-memory totals
//! - GET /v1/usage/recent - Recent records

use axum::http::StatusCode;
use costroute::routes::route::RouteResponse;
use costroute::routes::usage::{RecentUsage, UsageAccepted};
use serde_json::{json, Value};

use crate::common::{models, TestHarness};

async fn route(harness: &TestHarness, body: Value) -> RouteResponse {
    let response = harness.server.post("/v1/route").json(&body).await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn test_report_usage_is_accepted_and_priced() {
    let harness = TestHarness::reference();
    let routed = route(&harness, json!({ "intent": "general" })).await;
    assert_eq!(routed.decision.selected_model, models::DEEPSEEK);

    let response = harness
        .server
        .post("/v1/usage")
        .json(&json!({
            "decision": routed.decision,
            "input_tokens": 1000,
            "output_tokens": 500,
            "latency_ms": 850
        }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: UsageAccepted = response.json();
    assert_eq!(body.status, "accepted");
    assert_eq!(body.model, models::DEEPSEEK);
    // 1000 * 0.14 / 1M + 500 * 0.28 / 1M
    assert!((body.estimated_cost_usd - 0.00028).abs() < 1e-12);
}

#[tokio::test]
async fn test_summary_reflects_flushed_usage() {
    let harness = TestHarness::reference();
    let cheap = route(&harness, json!({ "intent": "general" })).await;
    let fallback = route(&harness, json!({ "intent": "general", "retry_count": 2 })).await;

    for (decision, input, output) in [
        (&cheap.decision, 1000, 500),
        (&cheap.decision, 3000, 1500),
        (&fallback.decision, 2000, 0),
    ] {
        harness
            .server
            .post("/v1/usage")
            .json(&json!({
                "decision": decision,
                "input_tokens": input,
                "output_tokens": output,
                "latency_ms": 100
            }))
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    harness.state.recorder.flush().await;

    let response = harness.server.get("/v1/usage/summary").await;
    response.assert_status_ok();
    let summary: Value = response.json();

    assert_eq!(summary["request_count"], 3);
    assert_eq!(summary["total_input_tokens"], 6000);
    assert_eq!(summary["total_output_tokens"], 2000);
    assert_eq!(summary["total_tokens"], 8000);
    assert_eq!(summary["avg_latency_ms"], 100);
    assert_eq!(summary["per_model"][models::DEEPSEEK]["requests"], 2);
    assert_eq!(summary["per_model"][models::GPT4O_MINI]["input_tokens"], 2000);

    let response = harness.server.get("/v1/usage/recent").await;
    response.assert_status_ok();
    let recent: RecentUsage = response.json();
    assert_eq!(recent.records.len(), 3);
    assert_eq!(recent.records[2].tier, "fallback");
}

#[tokio::test]
async fn test_empty_summary() {
    let harness = TestHarness::reference();

    let response = harness.server.get("/v1/usage/summary").await;

    response.assert_status_ok();
    let summary: Value = response.json();
    assert_eq!(summary["request_count"], 0);
    assert_eq!(summary["total_cost_usd"], 0.0);
}

#[tokio::test]
async fn test_report_without_decision_is_bad_request() {
    let harness = TestHarness::reference();

    let response = harness
        .server
        .post("/v1/usage")
        .json(&json!({ "input_tokens": 10, "output_tokens": 5 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_report_with_oversized_counts_is_rejected() {
    let harness = TestHarness::reference();
    let routed = route(&harness, json!({ "intent": "general" })).await;

    let response = harness
        .server
        .post("/v1/usage")
        .json(&json!({
            "decision": routed.decision,
            "input_tokens": u64::MAX,
            "output_tokens": 1
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    harness.state.recorder.flush().await;

    harness.server.get("/health").await.assert_status_ok();
    let summary: Value = harness.server.get("/v1/usage/summary").await.json();
    assert_eq!(summary["request_count"], 0);
}

#[tokio::test]
async fn test_report_for_unknown_model_is_rejected() {
    let harness = TestHarness::reference();
    let mut routed = route(&harness, json!({ "intent": "general" })).await;
    routed.decision.selected_model = "not-a-model".to_string();

    let response = harness
        .server
        .post("/v1/usage")
        .json(&json!({
            "decision": routed.decision,
            "input_tokens": 10,
            "output_tokens": 5
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not-a-model"));

    harness.state.recorder.flush().await;
    let summary: Value = harness.server.get("/v1/usage/summary").await.json();
    assert!(summary["per_model"].as_object().unwrap().is_empty());
}
