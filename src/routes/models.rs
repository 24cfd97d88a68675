//! Model health feedback endpoints
//!
//! Callers report the outcome of each model invocation so the router can
//! skip models in backoff. Model ids containing `/` must be percent-encoded
//! in the path (`deepseek%2Fdeepseek-chat`).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    routes::metrics::record_health_event,
    tiers::health::UnavailableModel,
    AppState,
};

/// Health state of one model after a report
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelHealthReport {
    pub model: String,
    pub available: bool,
    pub backoff_remaining_secs: u64,
}

/// Models currently in backoff
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelHealthList {
    pub unavailable: Vec<UnavailableModel>,
}

fn validate_model(model: &str) -> AppResult<&str> {
    let model = model.trim();
    if model.is_empty() {
        return Err(AppError::BadRequest("model must not be empty".to_string()));
    }
    Ok(model)
}

/// Only candidates of the live policy are tracked
fn known_model<'a>(state: &AppState, model: &'a str) -> AppResult<&'a str> {
    let model = validate_model(model)?;
    if !state.current_router().knows_model(model) {
        return Err(AppError::NotFound(format!(
            "Model '{}' is not a candidate of any tier",
            model
        )));
    }
    Ok(model)
}

fn report(state: &AppState, model: &str) -> ModelHealthReport {
    ModelHealthReport {
        model: model.to_string(),
        available: state.health_tracker.is_available(model),
        backoff_remaining_secs: state
            .health_tracker
            .backoff_remaining(model)
            .map(|remaining| remaining.as_secs())
            .unwrap_or(0),
    }
}

/// Report a failed invocation
pub async fn report_failure(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> AppResult<Json<ModelHealthReport>> {
    let model = known_model(&state, &model)?;
    state.health_tracker.record_failure(model);
    record_health_event(model, "failure");
    Ok(Json(report(&state, model)))
}

/// Report a successful invocation
pub async fn report_success(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> AppResult<Json<ModelHealthReport>> {
    let model = known_model(&state, &model)?;
    state.health_tracker.record_success(model);
    record_health_event(model, "success");
    Ok(Json(report(&state, model)))
}

/// List models in backoff
pub async fn list_model_health(State(state): State<Arc<AppState>>) -> Json<ModelHealthList> {
    Json(ModelHealthList {
        unavailable: state.health_tracker.unavailable_models(),
    })
}
