//! Costroute - Cost-first model routing
//!
//! This library decides which LLM tier and model serves a request, based on
//! request metadata, a declarative routing policy and observed model health.
//! It also records what each decision cost.

pub mod config;
pub mod error;
pub mod routes;
pub mod signals;
pub mod tiers;
pub mod tokens;
pub mod usage;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

pub use crate::config::Config;
pub use crate::error::{AppError, RouterError};
pub use crate::tiers::{ModelHealthTracker, ModelRouter, PolicyDocument, PolicySource, RequestContext, RoutingDecision};
pub use crate::tokens::SharedTokenCounter;
pub use crate::usage::{BatchingUsageRecorder, CostTable, InMemoryUsageSink, UsageRecorder};

use crate::error::RouterResult;
use crate::tiers::PolicySummary;
use crate::usage::{RedisUsageSink, UsageSink};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    /// Live router; replaced wholesale on policy reload
    router: RwLock<Arc<ModelRouter>>,
    pub policy_source: PolicySource,
    /// Health feedback shared by every router built from this state
    pub health_tracker: Arc<ModelHealthTracker>,
    /// Fire-and-forget usage recorder
    pub recorder: Arc<BatchingUsageRecorder>,
    /// In-process usage totals backing the summary endpoint
    pub memory_usage: Arc<InMemoryUsageSink>,
    /// Token counter for estimating input size with tiktoken-rs
    pub token_counter: SharedTokenCounter,
    /// Optional Redis connection for shared usage counters
    pub redis: Option<redis::aio::ConnectionManager>,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    ///
    /// Loads the routing policy and connects to Redis when `REDIS_URL` is
    /// configured. Policy errors are fatal.
    pub async fn new(config: Config) -> Result<Self> {
        let policy_source = config.policy_source();
        let document = policy_source
            .load()
            .with_context(|| format!("Failed to load routing policy from {}", policy_source.describe()))?;

        let redis = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())?;
                let manager = redis::aio::ConnectionManager::new(client)
                    .await
                    .context("Failed to connect to Redis")?;
                info!("Connected to Redis for usage counters");
                Some(manager)
            }
            None => {
                warn!("REDIS_URL not set, usage counters are kept in memory only");
                None
            }
        };

        Self::with_document(config, policy_source, &document, redis)
    }

    /// Build state from an already-loaded policy document
    ///
    /// Must be called inside a tokio runtime (the usage recorder spawns its
    /// worker).
    pub fn with_document(
        config: Config,
        policy_source: PolicySource,
        document: &PolicyDocument,
        redis: Option<redis::aio::ConnectionManager>,
    ) -> Result<Self> {
        let health_tracker = Arc::new(ModelHealthTracker::with_config(config.health_config()));
        let router = ModelRouter::from_document(document, health_tracker.clone())
            .context("Invalid routing policy")?;
        let costs = CostTable::new(&document.pricing);

        Ok(Self::from_parts(
            config,
            policy_source,
            router,
            health_tracker,
            costs,
            redis,
        ))
    }

    /// Assemble state from prebuilt parts
    pub fn from_parts(
        config: Config,
        policy_source: PolicySource,
        router: ModelRouter,
        health_tracker: Arc<ModelHealthTracker>,
        costs: CostTable,
        redis: Option<redis::aio::ConnectionManager>,
    ) -> Self {
        let memory_usage = Arc::new(InMemoryUsageSink::new());

        let mut sinks: Vec<Arc<dyn UsageSink>> = vec![memory_usage.clone()];
        if let Some(redis) = &redis {
            sinks.push(Arc::new(RedisUsageSink::new(redis.clone())));
        }

        let recorder = Arc::new(BatchingUsageRecorder::new(
            sinks,
            costs,
            config.batching_config(),
        ));

        Self {
            config,
            router: RwLock::new(Arc::new(router)),
            policy_source,
            health_tracker,
            recorder,
            memory_usage,
            token_counter: SharedTokenCounter::new(),
            redis,
            start_time: Instant::now(),
        }
    }

    /// Router serving new requests
    pub fn current_router(&self) -> Arc<ModelRouter> {
        self.router
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rebuild the router from the policy source and swap it in
    ///
    /// On any error the live router is left untouched. Pricing is fixed at
    /// startup and is not reloaded.
    pub fn reload_router(&self) -> RouterResult<PolicySummary> {
        let document = self.policy_source.load()?;
        let router = ModelRouter::from_document(&document, self.health_tracker.clone())?;
        let summary = router.summary();

        // Models dropped from the policy stop being tracked
        self.health_tracker
            .retain_models(|model| router.knows_model(model));
        *self.router.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(router);

        info!(
            source = %self.policy_source.describe(),
            tiers = summary.tiers.len(),
            rules = summary.rules.len(),
            "Routing policy reloaded"
        );
        Ok(summary)
    }
}
