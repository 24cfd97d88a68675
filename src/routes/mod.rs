//! HTTP routes for Costroute
//!
//! This module defines all HTTP endpoints exposed by the routing service.

pub mod health;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod route;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/v1/route", post(route::route_request))
        .route("/v1/usage", post(usage::report_usage))
        .route("/v1/usage/summary", get(usage::usage_summary))
        .route("/v1/usage/recent", get(usage::recent_usage))
        .route("/v1/models/health", get(models::list_model_health))
        .route("/v1/models/:model/failure", post(models::report_failure))
        .route("/v1/models/:model/success", post(models::report_success))
        .route("/v1/policy", get(policy::get_policy))
        .route("/v1/policy/reload", post(policy::reload_policy));

    // Public routes (health checks, metrics)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Global middleware (applied to all routes)
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
