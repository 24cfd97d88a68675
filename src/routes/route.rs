//! Routing endpoint
//!
//! `POST /v1/route` turns request metadata into a tier/model decision.
//! Callers either send pre-computed metadata or the raw input text, in which
//! case the input size is estimated and signals can be detected here.

use std::sync::Arc;
use std::time::Instant;

use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{AppError, AppResult},
    routes::metrics::{record_decision, record_route_error},
    signals::apply_text_signals,
    tiers::{RequestContext, RoutingDecision},
    AppState,
};

/// Route request body
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    /// Raw input; used for token estimation when no estimate is given
    #[serde(default)]
    pub input_text: Option<String>,
    /// Raise structured-output/sensitivity flags from `input_text`
    #[serde(default)]
    pub detect_signals: bool,
}

/// Route response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub request_id: String,
    pub decision: RoutingDecision,
}

impl RouteRequest {
    /// Final request context after estimation and signal detection
    fn into_context(self, state: &AppState) -> AppResult<RequestContext> {
        let mut context = self.context;

        if context.intent.trim().is_empty() {
            return Err(AppError::BadRequest("intent must not be empty".to_string()));
        }
        context.intent = context.intent.trim().to_string();

        match self.input_text {
            Some(text) => {
                if context.input_token_estimate == 0 {
                    context.input_token_estimate = state.token_counter.estimate_input_tokens(&text);
                }
                if self.detect_signals {
                    context = apply_text_signals(context, &text);
                }
            }
            None if self.detect_signals => {
                return Err(AppError::BadRequest(
                    "detect_signals requires input_text".to_string(),
                ));
            }
            None => {}
        }

        Ok(context)
    }
}

/// Route a request to a tier and model
pub async fn route_request(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<RouteResponse>> {
    let start_time = Instant::now();

    let request: RouteRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;
    let context = request.into_context(&state)?;

    // Hold the router for the whole call; a concurrent reload does not affect it
    let router = state.current_router();
    let decision = router.route(&context).await.map_err(|e| {
        warn!(
            intent = %context.intent,
            retry_count = context.retry_count,
            error = %e,
            "Routing failed"
        );
        record_route_error(e.kind());
        AppError::from(e)
    })?;

    record_decision(&decision, start_time.elapsed().as_secs_f64());

    if state.config.debug_enabled {
        debug!(context = ?context, decision = ?decision, "Full routing decision");
    }

    Ok(Json(RouteResponse {
        request_id: uuid::Uuid::new_v4().to_string(),
        decision,
    }))
}
