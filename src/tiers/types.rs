//! Core routing types
//!
//! Per-request metadata going into the router and the decision coming out.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Intent assumed when the classifier supplies none
pub const DEFAULT_INTENT: &str = "general";

fn default_intent() -> String {
    DEFAULT_INTENT.to_string()
}

/// A named bundle of candidate models plus token ceilings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Unique tier name (e.g., "cheap_general")
    pub name: String,
    /// Candidate models in preference order; first healthy wins
    pub candidate_models: Vec<String>,
    /// Hard input token ceiling
    pub max_input_tokens: u32,
    /// Hard output token ceiling
    pub max_output_tokens: u32,
}

/// Request metadata the routing decision is computed from
///
/// Immutable per routing decision; callers build a fresh one per attempt and
/// bump `retry_count` when re-routing after a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Task category supplied by the intent classifier
    #[serde(default = "default_intent")]
    pub intent: String,
    /// Estimated input size in tokens
    #[serde(default)]
    pub input_token_estimate: u64,
    /// Number of failed attempts that preceded this one
    #[serde(default)]
    pub retry_count: u32,
    /// Whether the response must be structured (JSON, tool calls)
    #[serde(default)]
    pub needs_structured_output: bool,
    /// Whether the content needs a more careful/compliant model
    #[serde(default)]
    pub sensitivity: bool,
    /// Output budget asked for by the caller, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_max_output_tokens: Option<u32>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(DEFAULT_INTENT)
    }
}

impl RequestContext {
    /// Create a context for an intent with every other field at rest
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            input_token_estimate: 0,
            retry_count: 0,
            needs_structured_output: false,
            sensitivity: false,
            requested_max_output_tokens: None,
        }
    }

    pub fn with_input_tokens(mut self, tokens: u64) -> Self {
        self.input_token_estimate = tokens;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_structured_output(mut self, needs_structured_output: bool) -> Self {
        self.needs_structured_output = needs_structured_output;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: bool) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_requested_output_tokens(mut self, tokens: u32) -> Self {
        self.requested_max_output_tokens = Some(tokens);
        self
    }

    /// Context for the next attempt after a failure
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.retry_count = next.retry_count.saturating_add(1);
        next
    }
}

/// Why a tier was chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum DecisionReason {
    /// A routing rule matched (rule name)
    Rule(String),
    /// No rule matched; the intent routing table supplied the tier
    Intent(String),
    /// No rule or intent mapping matched
    Default,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::Rule(name) => write!(f, "rule:{}", name),
            DecisionReason::Intent(intent) => write!(f, "intent:{}", intent),
            DecisionReason::Default => write!(f, "default"),
        }
    }
}

/// Output of a single routing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// The resolved tier
    pub tier: Tier,
    /// First healthy candidate of the tier
    pub selected_model: String,
    /// Clamped output token budget
    pub max_output_tokens: u32,
    /// Input ceiling of the tier, for truncation by the caller
    pub max_input_tokens: u32,
    /// Why this tier was chosen
    pub reason: DecisionReason,
}

impl RoutingDecision {
    /// Name of the resolved tier
    pub fn tier_name(&self) -> &str {
        &self.tier.name
    }

    /// Whether the estimated input exceeds the tier's input ceiling
    pub fn input_exceeds_limit(&self, input_token_estimate: u64) -> bool {
        input_token_estimate > u64::from(self.max_input_tokens)
    }
}
