//! Usage sinks
//!
//! Destinations for flushed usage batches. The in-memory sink keeps running
//! totals for the summary endpoint; the Redis sink keeps per-model and
//! per-tier counters shared across instances.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::AppResult;

use super::cost::round_to;
use super::UsageRecord;

/// Number of recent records the in-memory sink retains
pub const HISTORY_LIMIT: usize = 100;

/// Destination for batches of usage records
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Short name for logs and metrics
    fn name(&self) -> &'static str;

    async fn write(&self, records: &[UsageRecord]) -> AppResult<()>;
}

/// Per-model usage totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelUsage {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub total_latency_ms: u64,
}

impl ModelUsage {
    fn add(&mut self, record: &UsageRecord) {
        self.requests = self.requests.saturating_add(1);
        self.input_tokens = self.input_tokens.saturating_add(record.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(record.output_tokens);
        self.cost_usd += record.estimated_cost_usd;
        self.total_latency_ms = self.total_latency_ms.saturating_add(record.latency_ms);
    }
}

/// Usage summary exposed over HTTP
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub request_count: u64,
    pub avg_tokens_per_request: u64,
    pub avg_cost_per_request: f64,
    pub avg_latency_ms: u64,
    pub elapsed_seconds: u64,
    pub per_model: BTreeMap<String, ModelUsage>,
}

impl UsageSummary {
    /// One-line rendering for logs
    pub fn format_line(&self) -> String {
        format!(
            "Tokens: {} (in: {}, out: {}) | Cost: ${:.4} | Requests: {}",
            self.total_tokens,
            self.total_input_tokens,
            self.total_output_tokens,
            self.total_cost_usd,
            self.request_count
        )
    }
}

#[derive(Debug, Default)]
struct Ledger {
    totals: ModelUsage,
    per_model: BTreeMap<String, ModelUsage>,
    history: VecDeque<UsageRecord>,
}

/// In-process usage totals plus a short history
pub struct InMemoryUsageSink {
    ledger: RwLock<Ledger>,
    started_at: Instant,
}

impl InMemoryUsageSink {
    pub fn new() -> Self {
        Self {
            ledger: RwLock::new(Ledger::default()),
            started_at: Instant::now(),
        }
    }

    /// Add records synchronously
    pub fn apply(&self, records: &[UsageRecord]) {
        let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            ledger.totals.add(record);
            ledger
                .per_model
                .entry(record.model.clone())
                .or_default()
                .add(record);

            ledger.history.push_back(record.clone());
            if ledger.history.len() > HISTORY_LIMIT {
                ledger.history.pop_front();
            }
        }
    }

    /// Most recent records, oldest first
    pub fn recent(&self) -> Vec<UsageRecord> {
        let ledger = self.ledger.read().unwrap_or_else(PoisonError::into_inner);
        ledger.history.iter().cloned().collect()
    }

    pub fn summary(&self) -> UsageSummary {
        let ledger = self.ledger.read().unwrap_or_else(PoisonError::into_inner);
        let totals = &ledger.totals;
        let requests = totals.requests.max(1);
        let total_tokens = totals.input_tokens.saturating_add(totals.output_tokens);

        UsageSummary {
            total_input_tokens: totals.input_tokens,
            total_output_tokens: totals.output_tokens,
            total_tokens,
            total_cost_usd: round_to(totals.cost_usd, 4),
            request_count: totals.requests,
            avg_tokens_per_request: total_tokens / requests,
            avg_cost_per_request: round_to(totals.cost_usd / requests as f64, 6),
            avg_latency_ms: totals.total_latency_ms / requests,
            elapsed_seconds: self.started_at.elapsed().as_secs(),
            per_model: ledger.per_model.clone(),
        }
    }
}

impl Default for InMemoryUsageSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageSink for InMemoryUsageSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write(&self, records: &[UsageRecord]) -> AppResult<()> {
        self.apply(records);
        Ok(())
    }
}

/// Redis key names for usage counters
pub mod keys {
    /// Hash of counters for one model
    pub fn model_usage(model: &str) -> String {
        format!("costroute:usage:model:{}", model)
    }

    /// Hash of counters for one tier
    pub fn tier_usage(tier: &str) -> String {
        format!("costroute:usage:tier:{}", tier)
    }
}

/// Redis-backed usage counters
///
/// Records are aggregated per model and per tier before being sent, so a
/// batch costs one pipelined round trip regardless of its size.
pub struct RedisUsageSink {
    redis: redis::aio::ConnectionManager,
}

impl RedisUsageSink {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }
}

/// Counter value for `HINCRBY`, which only takes i64
fn redis_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Aggregate records by hash key
fn aggregate(records: &[UsageRecord]) -> HashMap<String, ModelUsage> {
    let mut totals: HashMap<String, ModelUsage> = HashMap::new();
    for record in records {
        totals.entry(keys::model_usage(&record.model)).or_default().add(record);
        totals.entry(keys::tier_usage(&record.tier)).or_default().add(record);
    }
    totals
}

#[async_trait]
impl UsageSink for RedisUsageSink {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn write(&self, records: &[UsageRecord]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let totals = aggregate(records);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, usage) in &totals {
            pipe.hincr(key, "requests", redis_count(usage.requests))
                .ignore()
                .hincr(key, "input_tokens", redis_count(usage.input_tokens))
                .ignore()
                .hincr(key, "output_tokens", redis_count(usage.output_tokens))
                .ignore()
                .hincr(key, "latency_ms", redis_count(usage.total_latency_ms))
                .ignore()
                .hincr(key, "cost_usd", usage.cost_usd)
                .ignore();
        }

        let mut conn = self.redis.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;

        debug!(
            records = records.len(),
            keys = totals.len(),
            "Wrote usage counters to Redis"
        );
        Ok(())
    }
}
