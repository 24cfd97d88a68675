//! Usage recording module
//!
//! Records what each routing decision actually cost: selected model, token
//! counts, latency and estimated spend. Recording is fire-and-forget and can
//! never fail or slow down the routing path.

pub mod batching;
pub mod cost;
pub mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tiers::RoutingDecision;

pub use batching::{BatchingConfig, BatchingUsageRecorder};
pub use cost::{CostTable, ModelPrice};
pub use sink::{InMemoryUsageSink, RedisUsageSink, UsageSink, UsageSummary};

/// One completed model invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub tier: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
    pub estimated_cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Build a record for a decision, pricing it with the given table
    pub fn from_decision(
        decision: &RoutingDecision,
        input_tokens: u64,
        output_tokens: u64,
        latency_ms: u64,
        costs: &CostTable,
    ) -> Self {
        Self {
            tier: decision.tier.name.clone(),
            model: decision.selected_model.clone(),
            input_tokens,
            output_tokens,
            latency_ms,
            estimated_cost_usd: costs.estimate(&decision.selected_model, input_tokens, output_tokens),
            recorded_at: Utc::now(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Sink the router's caller writes outcomes to
///
/// Implementations must not block and must swallow their own failures.
pub trait UsageRecorder: Send + Sync {
    fn record(
        &self,
        decision: &RoutingDecision,
        input_tokens: u64,
        output_tokens: u64,
        latency_ms: u64,
    );
}

/// Recorder that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageRecorder;

impl UsageRecorder for NoopUsageRecorder {
    fn record(&self, _decision: &RoutingDecision, _input: u64, _output: u64, _latency_ms: u64) {}
}
