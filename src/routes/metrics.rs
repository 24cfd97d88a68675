//! Prometheus metrics endpoint
//!
//! Exposes routing and usage metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

use crate::tiers::{DecisionReason, RoutingDecision};

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "costroute_route_decisions_total",
        "Routing decisions by tier, model and reason"
    );
    metrics::describe_counter!(
        "costroute_route_errors_total",
        "Routing failures by error kind"
    );
    metrics::describe_histogram!(
        "costroute_route_duration_seconds",
        "Time spent computing a routing decision"
    );
    metrics::describe_counter!(
        "costroute_usage_tokens_total",
        "Tokens reported through the usage recorder"
    );
    metrics::describe_counter!(
        "costroute_usage_cost_micro_usd_total",
        "Estimated spend in micro-USD"
    );
    metrics::describe_counter!(
        "costroute_usage_dropped_total",
        "Usage records dropped because the queue was full"
    );
    metrics::describe_counter!(
        "costroute_model_health_events_total",
        "Model success/failure reports"
    );
    metrics::describe_counter!(
        "costroute_policy_reloads_total",
        "Policy reload attempts by outcome"
    );
}

/// Prometheus metrics endpoint handler
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

fn reason_label(reason: &DecisionReason) -> &'static str {
    match reason {
        DecisionReason::Rule(_) => "rule",
        DecisionReason::Intent(_) => "intent",
        DecisionReason::Default => "default",
    }
}

/// Record a successful routing decision
pub fn record_decision(decision: &RoutingDecision, duration_secs: f64) {
    metrics::counter!(
        "costroute_route_decisions_total",
        "tier" => decision.tier.name.clone(),
        "model" => decision.selected_model.clone(),
        "reason" => reason_label(&decision.reason)
    )
    .increment(1);
    metrics::histogram!("costroute_route_duration_seconds", "tier" => decision.tier.name.clone())
        .record(duration_secs);
}

/// Record a routing failure
pub fn record_route_error(kind: &'static str) {
    metrics::counter!("costroute_route_errors_total", "kind" => kind).increment(1);
}

/// Record a health report for a model
pub fn record_health_event(model: &str, outcome: &'static str) {
    metrics::counter!(
        "costroute_model_health_events_total",
        "model" => model.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a policy reload attempt
pub fn record_policy_reload(outcome: &'static str) {
    metrics::counter!("costroute_policy_reloads_total", "outcome" => outcome).increment(1);
}
