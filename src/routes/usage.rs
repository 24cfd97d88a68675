//! Usage reporting endpoints
//!
//! Callers report what a routed invocation actually consumed. Reporting is
//! fire-and-forget: the record is queued and the response returns at once.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    tiers::RoutingDecision,
    usage::{UsageRecord, UsageRecorder, UsageSummary},
    AppState,
};

/// Largest token or latency count accepted in a report (Redis counters are i64)
pub const MAX_REPORTED_COUNT: u64 = i64::MAX as u64;

/// Usage report body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    /// Decision returned by `/v1/route`
    pub decision: RoutingDecision,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub latency_ms: u64,
}

/// Acknowledgement for a queued usage report
#[derive(Debug, Serialize, Deserialize)]
pub struct UsageAccepted {
    pub status: String,
    pub model: String,
    pub estimated_cost_usd: f64,
}

/// Recent usage records
#[derive(Debug, Serialize, Deserialize)]
pub struct RecentUsage {
    pub records: Vec<UsageRecord>,
}

/// Queue a usage record
pub async fn report_usage(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<UsageAccepted>)> {
    let report: UsageReport = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid usage report: {}", e)))?;

    let model = report.decision.selected_model.trim();
    if model.is_empty() {
        return Err(AppError::BadRequest(
            "decision.selected_model must not be empty".to_string(),
        ));
    }
    validate_counts(&report)?;

    let router = state.current_router();
    if !router.knows_model(&report.decision.selected_model) {
        return Err(AppError::BadRequest(format!(
            "Model '{}' is not a candidate of any tier",
            model
        )));
    }
    if !router.registry().contains(report.decision.tier_name()) {
        return Err(AppError::BadRequest(format!(
            "Unknown tier '{}'",
            report.decision.tier_name()
        )));
    }

    let estimated_cost_usd =
        state
            .recorder
            .costs()
            .estimate(model, report.input_tokens, report.output_tokens);

    state.recorder.record(
        &report.decision,
        report.input_tokens,
        report.output_tokens,
        report.latency_ms,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(UsageAccepted {
            status: "accepted".to_string(),
            model: report.decision.selected_model.clone(),
            estimated_cost_usd,
        }),
    ))
}

fn validate_counts(report: &UsageReport) -> AppResult<()> {
    for (field, value) in [
        ("input_tokens", report.input_tokens),
        ("output_tokens", report.output_tokens),
        ("latency_ms", report.latency_ms),
    ] {
        if value > MAX_REPORTED_COUNT {
            return Err(AppError::BadRequest(format!(
                "{} must not exceed {}",
                field, MAX_REPORTED_COUNT
            )));
        }
    }
    Ok(())
}

/// In-process usage totals
pub async fn usage_summary(State(state): State<Arc<AppState>>) -> Json<UsageSummary> {
    Json(state.memory_usage.summary())
}

/// Most recent usage records, oldest first
pub async fn recent_usage(State(state): State<Arc<AppState>>) -> Json<RecentUsage> {
    Json(RecentUsage {
        records: state.memory_usage.recent(),
    })
}
