//! Error types for Costroute
//!
//! `RouterError` covers the routing core. `AppError` wraps it for the HTTP
//! surface and adds transport-level failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while loading a policy or routing a request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    /// Malformed or incomplete tier/rule definitions. Fatal at startup.
    #[error("Invalid routing configuration: {0}")]
    InvalidConfiguration(String),

    /// A rule or intent mapping references a tier absent from the registry
    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    /// Every candidate in the resolved tier is currently unreachable
    #[error("No healthy model in tier {tier} (candidates: {})", candidates.join(", "))]
    NoHealthyModel {
        tier: String,
        candidates: Vec<String>,
    },
}

impl RouterError {
    /// Shorthand for building an `InvalidConfiguration` error
    pub fn invalid(message: impl Into<String>) -> Self {
        RouterError::InvalidConfiguration(message.into())
    }

    /// Stable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RouterError::InvalidConfiguration(_) => "invalid_configuration",
            RouterError::UnknownTier(_) => "unknown_tier",
            RouterError::NoHealthyModel { .. } => "no_healthy_model",
        }
    }
}

/// Result type for the routing core
pub type RouterResult<T> = Result<T, RouterError>;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Routing(#[from] RouterError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, tier) = match &self {
            AppError::Routing(RouterError::InvalidConfiguration(msg)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_CONFIGURATION",
                msg.clone(),
                None,
            ),
            AppError::Routing(RouterError::UnknownTier(tier)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "UNKNOWN_TIER",
                self.to_string(),
                Some(tier.clone()),
            ),
            AppError::Routing(RouterError::NoHealthyModel { tier, .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NO_HEALTHY_MODEL",
                self.to_string(),
                Some(tier.clone()),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            AppError::RedisError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "Usage store error".to_string(),
                None,
            ),
            AppError::JsonError(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_JSON",
                "Invalid JSON in request".to_string(),
                None,
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                tier,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
