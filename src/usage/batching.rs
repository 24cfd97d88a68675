//! Batching Usage Recorder
//!
//! Fire-and-forget usage recording. `record()` prices the invocation and
//! pushes it onto a bounded MPSC channel; a background task batches records
//! and writes them to every configured sink.
//!
//! Features:
//! - Non-blocking `record()` that never fails (drops and logs when full)
//! - Flushes on batch size or interval, and on shutdown
//! - Rate limits sink writes with governor
//! - Per-sink circuit breaker so a dead store cannot stall the others

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::tiers::RoutingDecision;

use super::cost::CostTable;
use super::sink::UsageSink;
use super::{UsageRecord, UsageRecorder};

/// Configuration for the batching usage recorder
#[derive(Debug, Clone)]
pub struct BatchingConfig {
    /// Maximum number of records to batch before flushing
    pub max_batch_size: usize,
    /// Maximum time to wait before flushing a batch
    pub flush_interval: Duration,
    /// Channel buffer size for handling traffic spikes
    pub channel_buffer: usize,
    /// Maximum sink writes per second
    pub rate_limit_per_second: u32,
    /// Number of consecutive failures before a sink's circuit opens
    pub circuit_breaker_threshold: u32,
    /// Time to wait before probing an open circuit again
    pub circuit_breaker_reset: Duration,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            flush_interval: Duration::from_millis(500),
            channel_buffer: 10_000,
            rate_limit_per_second: 20,
            circuit_breaker_threshold: 3,
            circuit_breaker_reset: Duration::from_secs(30),
        }
    }
}

/// Messages to the background worker
enum Command {
    Record(UsageRecord),
    Flush(oneshot::Sender<()>),
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_gauge(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

#[derive(Debug)]
struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            threshold: threshold.max(1),
            reset_after,
        }
    }

    /// Whether a write may be attempted now
    fn allow(&mut self) -> bool {
        if self.state == CircuitState::Open {
            match self.opened_at {
                Some(opened_at) if opened_at.elapsed() >= self.reset_after => {
                    debug!("Circuit breaker transitioning to half-open");
                    self.state = CircuitState::HalfOpen;
                }
                _ => return false,
            }
        }
        true
    }

    fn on_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            debug!("Circuit breaker closing after successful write");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Returns true when this failure opened the circuit
    fn on_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let should_open = self.state == CircuitState::HalfOpen
            || self.consecutive_failures >= self.threshold;
        if should_open && self.state != CircuitState::Open {
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
            return true;
        }
        false
    }
}

struct SinkSlot {
    sink: Arc<dyn UsageSink>,
    breaker: CircuitBreaker,
}

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Batching usage recorder
pub struct BatchingUsageRecorder {
    sender: mpsc::Sender<Command>,
    costs: CostTable,
    _worker: JoinHandle<()>,
}

impl BatchingUsageRecorder {
    /// Create a new batching recorder
    ///
    /// Spawns the background worker; must be called inside a tokio runtime.
    pub fn new(sinks: Vec<Arc<dyn UsageSink>>, costs: CostTable, config: BatchingConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.channel_buffer.max(1));
        let worker = tokio::spawn(Self::background_worker(sinks, receiver, config));

        Self {
            sender,
            costs,
            _worker: worker,
        }
    }

    /// Pricing used for new records
    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    /// Queue a record without blocking
    pub fn record_usage(&self, record: UsageRecord) {
        metrics::record_usage(&record);
        self.send(Command::Record(record));
    }

    /// Flush everything queued so far and wait for the sinks to be written
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).await.is_err() {
            warn!("Usage recorder worker is gone, nothing to flush");
            return;
        }
        let _ = done.await;
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.sender.try_send(command) {
            metrics::record_dropped();
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("Usage recording channel full, dropping record");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    error!("Usage recording channel closed, dropping record");
                }
            }
        }
    }

    /// Background worker that batches and writes records
    async fn background_worker(
        sinks: Vec<Arc<dyn UsageSink>>,
        mut receiver: mpsc::Receiver<Command>,
        config: BatchingConfig,
    ) {
        info!(
            batch_size = config.max_batch_size,
            flush_interval_ms = config.flush_interval.as_millis(),
            rate_limit = config.rate_limit_per_second,
            sinks = sinks.len(),
            "Starting batching usage recorder worker"
        );

        let per_second = NonZeroU32::new(config.rate_limit_per_second).unwrap_or(nonzero!(20u32));
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        let mut slots: Vec<SinkSlot> = sinks
            .into_iter()
            .map(|sink| SinkSlot {
                sink,
                breaker: CircuitBreaker::new(
                    config.circuit_breaker_threshold,
                    config.circuit_breaker_reset,
                ),
            })
            .collect();

        let mut buffer: Vec<UsageRecord> = Vec::with_capacity(config.max_batch_size);
        let mut last_flush = Instant::now();

        loop {
            let time_until_flush = config.flush_interval.saturating_sub(last_flush.elapsed());

            tokio::select! {
                command = receiver.recv() => {
                    match command {
                        Some(Command::Record(record)) => {
                            buffer.push(record);
                            if buffer.len() >= config.max_batch_size {
                                Self::flush_buffer(&mut slots, &rate_limiter, &mut buffer).await;
                                last_flush = Instant::now();
                            }
                        }
                        Some(Command::Flush(ack)) => {
                            Self::flush_buffer(&mut slots, &rate_limiter, &mut buffer).await;
                            last_flush = Instant::now();
                            let _ = ack.send(());
                        }
                        None => {
                            // Channel closed, flush remaining and exit
                            Self::flush_buffer(&mut slots, &rate_limiter, &mut buffer).await;
                            info!("Batching usage recorder shutting down");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(time_until_flush) => {
                    Self::flush_buffer(&mut slots, &rate_limiter, &mut buffer).await;
                    last_flush = Instant::now();
                }
            }
        }
    }

    /// Write the buffer to every sink whose circuit allows it
    async fn flush_buffer(
        slots: &mut [SinkSlot],
        rate_limiter: &DirectRateLimiter,
        buffer: &mut Vec<UsageRecord>,
    ) {
        if buffer.is_empty() {
            return;
        }

        let batch: Vec<UsageRecord> = std::mem::take(buffer);
        debug!(record_count = batch.len(), "Flushing usage records");

        for slot in slots.iter_mut() {
            let sink_name = slot.sink.name();

            if !slot.breaker.allow() {
                warn!(
                    sink = sink_name,
                    dropped_count = batch.len(),
                    "Circuit breaker open, dropping usage batch"
                );
                metrics::record_sink_write(sink_name, "dropped");
                continue;
            }

            rate_limiter.until_ready().await;

            match slot.sink.write(&batch).await {
                Ok(()) => {
                    slot.breaker.on_success();
                    metrics::record_sink_write(sink_name, "success");
                }
                Err(e) => {
                    metrics::record_sink_write(sink_name, "failure");
                    warn!(
                        sink = sink_name,
                        record_count = batch.len(),
                        error = %e,
                        consecutive_failures = slot.breaker.consecutive_failures + 1,
                        "Failed to write usage batch"
                    );
                    if slot.breaker.on_failure() {
                        error!(
                            sink = sink_name,
                            threshold = slot.breaker.threshold,
                            reset_seconds = slot.breaker.reset_after.as_secs(),
                            "Circuit breaker opening due to consecutive failures"
                        );
                    }
                }
            }
            metrics::set_circuit_state(sink_name, slot.breaker.state.as_gauge());
        }
    }
}

impl UsageRecorder for BatchingUsageRecorder {
    fn record(
        &self,
        decision: &RoutingDecision,
        input_tokens: u64,
        output_tokens: u64,
        latency_ms: u64,
    ) {
        let record =
            UsageRecord::from_decision(decision, input_tokens, output_tokens, latency_ms, &self.costs);

        info!(
            tier = %record.tier,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost_usd = record.estimated_cost_usd,
            latency_ms = record.latency_ms,
            "Usage recorded"
        );

        self.record_usage(record);
    }
}

/// Metrics for the usage recorder
pub mod metrics {
    use metrics::{counter, gauge};

    use crate::usage::UsageRecord;

    /// Tokens and spend per model
    pub fn record_usage(record: &UsageRecord) {
        counter!(
            "costroute_usage_tokens_total",
            "type" => "input",
            "model" => record.model.clone()
        )
        .increment(record.input_tokens);
        counter!(
            "costroute_usage_tokens_total",
            "type" => "output",
            "model" => record.model.clone()
        )
        .increment(record.output_tokens);
        // Counters are integral; spend is tracked in micro-dollars
        counter!("costroute_usage_cost_micro_usd_total", "model" => record.model.clone())
            .increment((record.estimated_cost_usd * 1_000_000.0).round() as u64);
    }

    /// Record a dropped record due to a full or closed channel
    pub fn record_dropped() {
        counter!("costroute_usage_dropped_total").increment(1);
    }

    /// Record the outcome of a sink write
    pub fn record_sink_write(sink: &'static str, outcome: &'static str) {
        counter!("costroute_usage_sink_writes_total", "sink" => sink, "outcome" => outcome)
            .increment(1);
    }

    /// Set the circuit breaker state (0=closed, 1=half-open, 2=open)
    pub fn set_circuit_state(sink: &'static str, state: u8) {
        gauge!("costroute_usage_circuit_state", "sink" => sink).set(state as f64);
    }
}
