//! Policy inspection and reload endpoints

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    error::{AppError, AppResult},
    routes::metrics::record_policy_reload,
    tiers::PolicySummary,
    AppState,
};

/// Loaded policy plus where it came from
#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub source: String,
    pub policy: PolicySummary,
}

/// Show the live policy
pub async fn get_policy(State(state): State<Arc<AppState>>) -> Json<PolicyResponse> {
    Json(PolicyResponse {
        source: state.policy_source.describe(),
        policy: state.current_router().summary(),
    })
}

/// Rebuild the router from the policy source
///
/// A policy that fails to load or validate leaves the live router in place.
pub async fn reload_policy(State(state): State<Arc<AppState>>) -> AppResult<Json<PolicyResponse>> {
    match state.reload_router() {
        Ok(policy) => {
            record_policy_reload("success");
            Ok(Json(PolicyResponse {
                source: state.policy_source.describe(),
                policy,
            }))
        }
        Err(e) => {
            error!(
                source = %state.policy_source.describe(),
                error = %e,
                "Policy reload failed, keeping current policy"
            );
            record_policy_reload("failure");
            Err(AppError::from(e))
        }
    }
}
