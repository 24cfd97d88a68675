//! Health check endpoints
//!
//! Provides endpoints for monitoring and container orchestration:
//! - `/health` - Full health check with dependency status
//! - `/health/ready` - Readiness probe
//! - `/health/live` - Liveness probe

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual dependency check result
#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State of the loaded routing policy
#[derive(Debug, Serialize)]
pub struct PolicyCheck {
    pub status: HealthStatus,
    pub source: String,
    pub tiers: usize,
    pub default_tier: String,
    /// Models of the default tier not currently in backoff
    pub default_tier_available_models: usize,
}

/// Dependency checks collection
#[derive(Debug, Serialize)]
pub struct DependencyChecks {
    pub policy: PolicyCheck,
    /// Absent when no Redis is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<DependencyCheck>,
}

/// Application statistics
#[derive(Debug, Serialize)]
pub struct HealthStats {
    pub uptime_seconds: u64,
    pub models_in_backoff: usize,
    pub usage_requests_recorded: u64,
}

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub checks: DependencyChecks,
    pub stats: HealthStats,
}

/// Simple health response for liveness/readiness
#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

/// Check Redis connectivity, if configured
async fn check_redis(state: &AppState) -> Option<DependencyCheck> {
    let mut conn = state.redis.clone()?;
    let start = Instant::now();

    let check = match redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
    {
        Ok(_) => DependencyCheck {
            status: HealthStatus::Healthy,
            latency_ms: start.elapsed().as_millis() as u64,
            error: None,
        },
        Err(e) => DependencyCheck {
            status: HealthStatus::Unhealthy,
            latency_ms: start.elapsed().as_millis() as u64,
            error: Some(e.to_string()),
        },
    };
    Some(check)
}

/// Check that the default tier still has a usable model
fn check_policy(state: &AppState) -> PolicyCheck {
    let router = state.current_router();
    let default_tier = router.registry().default_tier();
    let available = default_tier
        .candidate_models
        .iter()
        .filter(|model| state.health_tracker.is_available(model))
        .count();

    PolicyCheck {
        status: if available > 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        source: state.policy_source.describe(),
        tiers: router.registry().len(),
        default_tier: default_tier.name.clone(),
        default_tier_available_models: available,
    }
}

/// Full health check endpoint
///
/// Redis only mirrors usage counters, so a failing Redis degrades the
/// service rather than taking it down. A default tier with every model in
/// backoff makes it unhealthy.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let policy_check = check_policy(&state);
    let redis_check = check_redis(&state).await;

    let redis_down = redis_check
        .as_ref()
        .map(|check| check.status == HealthStatus::Unhealthy)
        .unwrap_or(false);

    let overall_status = if policy_check.status == HealthStatus::Unhealthy {
        HealthStatus::Unhealthy
    } else if redis_down {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let uptime = state.start_time.elapsed().as_secs();

    let response = HealthResponse {
        status: overall_status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks: DependencyChecks {
            policy: policy_check,
            redis: redis_check,
        },
        stats: HealthStats {
            uptime_seconds: uptime,
            models_in_backoff: state.health_tracker.unavailable_models().len(),
            usage_requests_recorded: state.memory_usage.summary().request_count,
        },
    };

    let status_code = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

/// Readiness probe endpoint
///
/// Returns 200 OK while the default tier has at least one model outside
/// backoff. Used by Kubernetes readiness probes.
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SimpleHealthResponse>) {
    if check_policy(&state).status == HealthStatus::Unhealthy {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SimpleHealthResponse {
                status: HealthStatus::Unhealthy,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}

/// Liveness probe endpoint
///
/// Returns 200 OK if the application is alive.
/// Used by Kubernetes liveness probes.
pub async fn liveness_check() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}
