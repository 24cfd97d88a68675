//! Model health tracking with exponential backoff
//!
//! The router only ever asks one question of this layer: is a model healthy
//! right now. `ModelHealthTracker` answers it from failures reported by the
//! invocation layer; each failure pushes the model into an exponentially
//! growing backoff window.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of a health probe itself (as opposed to an unhealthy answer)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HealthCheckError {
    #[error("health probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("health probe failed: {0}")]
    Probe(String),
}

/// Injected health-check collaborator
///
/// Owned and updated outside the router; the router only reads a snapshot
/// per call and treats probe errors as "not healthy".
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn is_healthy(&self, model: &str) -> Result<bool, HealthCheckError>;
}

/// Configuration for health tracking
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Initial backoff duration after first failure (default: 30 seconds)
    pub initial_backoff: Duration,
    /// Maximum backoff duration (default: 5 minutes)
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300), // 5 minutes
            backoff_multiplier: 2.0,
        }
    }
}

/// Health state for a model
#[derive(Debug, Clone)]
struct HealthState {
    available: bool,
    last_failure: Option<Instant>,
    backoff_duration: Duration,
    consecutive_failures: u32,
}

impl HealthState {
    fn healthy(initial_backoff: Duration) -> Self {
        Self {
            available: true,
            last_failure: None,
            backoff_duration: initial_backoff,
            consecutive_failures: 0,
        }
    }

    /// Failed and still inside the backoff window
    fn in_backoff(&self) -> bool {
        !self.available
            && self
                .last_failure
                .is_some_and(|last| last.elapsed() < self.backoff_duration)
    }
}

/// A model currently in backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableModel {
    pub model: String,
    pub consecutive_failures: u32,
    pub backoff_remaining_secs: u64,
}

/// Tracks health of models
///
/// State is in-memory per process; each instance judges health from its own
/// observations.
pub struct ModelHealthTracker {
    states: RwLock<HashMap<String, HealthState>>,
    config: HealthConfig,
}

impl ModelHealthTracker {
    /// Create a new health tracker with default configuration
    pub fn new() -> Self {
        Self::with_config(HealthConfig::default())
    }

    /// Create a new health tracker with custom configuration
    pub fn with_config(config: HealthConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Check if a model is currently available
    ///
    /// True when the model was never seen, is healthy, or its backoff has
    /// elapsed (ready to retry).
    pub fn is_available(&self, model: &str) -> bool {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);

        match states.get(model) {
            None => true,
            Some(state) if state.in_backoff() => false,
            Some(state) => {
                if !state.available {
                    debug!(
                        model = %model,
                        backoff_secs = state.backoff_duration.as_secs(),
                        "Backoff elapsed, model ready for retry"
                    );
                }
                true
            }
        }
    }

    /// Remaining backoff for a model, if it is in backoff
    pub fn backoff_remaining(&self, model: &str) -> Option<Duration> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);

        states.get(model).filter(|state| state.in_backoff()).and_then(|state| {
            state
                .last_failure
                .map(|last| state.backoff_duration.saturating_sub(last.elapsed()))
        })
    }

    /// Record a successful call (reset backoff)
    pub fn record_success(&self, model: &str) {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(state) = states.get(model) {
            if !state.available || state.consecutive_failures > 0 {
                info!(
                    model = %model,
                    previous_failures = state.consecutive_failures,
                    "Model recovered, resetting health state"
                );
            }
        }

        states.insert(
            model.to_string(),
            HealthState::healthy(self.config.initial_backoff),
        );
    }

    /// Record a failed call (apply exponential backoff)
    pub fn record_failure(&self, model: &str) {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);

        let initial = self.config.initial_backoff;
        let state = states
            .entry(model.to_string())
            .or_insert_with(|| HealthState::healthy(initial));
        state.available = false;
        state.last_failure = Some(Instant::now());
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        // initial * multiplier^(failures-1), capped
        let exponent = i32::try_from(state.consecutive_failures - 1).unwrap_or(i32::MAX);
        let backoff_secs = (initial.as_secs_f64() * self.config.backoff_multiplier.powi(exponent))
            .min(self.config.max_backoff.as_secs_f64());
        state.backoff_duration = Duration::from_secs_f64(backoff_secs);

        warn!(
            model = %model,
            consecutive_failures = state.consecutive_failures,
            backoff_secs = state.backoff_duration.as_secs(),
            "Model failure recorded, entering backoff"
        );
    }

    /// Drop state for models the predicate rejects
    pub fn retain_models<F>(&self, keep: F)
    where
        F: Fn(&str) -> bool,
    {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        states.retain(|model, _| keep(model));
    }

    /// Models still inside their backoff window, sorted by name
    pub fn unavailable_models(&self) -> Vec<UnavailableModel> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        let mut models: Vec<UnavailableModel> = states
            .iter()
            .filter(|(_, state)| state.in_backoff())
            .map(|(model, state)| UnavailableModel {
                model: model.clone(),
                consecutive_failures: state.consecutive_failures,
                backoff_remaining_secs: state
                    .last_failure
                    .map(|last| state.backoff_duration.saturating_sub(last.elapsed()).as_secs())
                    .unwrap_or(0),
            })
            .collect();
        models.sort_by(|a, b| a.model.cmp(&b.model));
        models
    }
}

impl Default for ModelHealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthCheck for ModelHealthTracker {
    async fn is_healthy(&self, model: &str) -> Result<bool, HealthCheckError> {
        Ok(self.is_available(model))
    }
}

/// Fixed health answers, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticHealthCheck {
    unhealthy: HashSet<String>,
    failing: HashSet<String>,
}

impl StaticHealthCheck {
    /// Every model healthy
    pub fn all_healthy() -> Self {
        Self::default()
    }

    /// The given models report unhealthy
    pub fn with_unhealthy<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unhealthy: models.into_iter().map(Into::into).collect(),
            failing: HashSet::new(),
        }
    }

    /// Probes for the given models fail with a timeout
    pub fn with_probe_timeouts<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(models.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl HealthCheck for StaticHealthCheck {
    async fn is_healthy(&self, model: &str) -> Result<bool, HealthCheckError> {
        if self.failing.contains(model) {
            return Err(HealthCheckError::Timeout(Duration::from_secs(5)));
        }
        Ok(!self.unhealthy.contains(model))
    }
}
