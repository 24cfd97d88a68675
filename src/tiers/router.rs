//! Cost-first model router
//!
//! Turns a `RequestContext` into a `RoutingDecision`:
//! 1. Rule engine picks a tier name
//! 2. Registry resolves the tier (unknown tiers fail, never degrade)
//! 3. First healthy candidate in preference order wins
//! 4. Output budget is clamped to the tier (and intent) ceilings
//!
//! The router is immutable after construction. Changing policy means
//! building a new router; calls in flight keep the one they started with.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{RouterError, RouterResult};

use super::config::PolicyDocument;
use super::health::HealthCheck;
use super::registry::TierRegistry;
use super::rules::{RuleEngine, TieBreak};
use super::types::{RequestContext, RoutingDecision, Tier};

/// Read-only view of the loaded policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub default_tier: String,
    pub tie_break: TieBreak,
    pub tiers: Vec<Tier>,
    pub rules: Vec<String>,
    pub intent_routing: BTreeMap<String, String>,
    pub intent_limits: BTreeMap<String, u32>,
}

/// Deterministic tier/model router
pub struct ModelRouter {
    registry: TierRegistry,
    engine: RuleEngine,
    intent_limits: BTreeMap<String, u32>,
    intent_routing: BTreeMap<String, String>,
    health: Arc<dyn HealthCheck>,
}

impl ModelRouter {
    /// Create a router from already-built parts
    ///
    /// Rule targets are not cross-checked here; a rule pointing at a missing
    /// tier fails the request with `UnknownTier`.
    pub fn new(registry: TierRegistry, engine: RuleEngine, health: Arc<dyn HealthCheck>) -> Self {
        Self {
            registry,
            engine,
            intent_limits: BTreeMap::new(),
            intent_routing: BTreeMap::new(),
            health,
        }
    }

    /// Cap output tokens per intent (applied on top of the tier ceiling)
    pub fn with_intent_limits(mut self, intent_limits: BTreeMap<String, u32>) -> Self {
        self.intent_limits = intent_limits
            .into_iter()
            .map(|(intent, limit)| (intent.to_ascii_lowercase(), limit))
            .collect();
        self
    }

    /// Build a router from a policy document
    ///
    /// Stricter than `new`: every tier referenced by a rule, the intent
    /// routing table or the default must exist, so a bad policy fails at
    /// load instead of on a request.
    pub fn from_document(document: &PolicyDocument, health: Arc<dyn HealthCheck>) -> RouterResult<Self> {
        let registry = TierRegistry::from_specs(
            &document.tiers,
            &document.default_tier,
            &document.model_limits,
        )?;

        let engine = RuleEngine::new(
            document.rules.clone(),
            document.intent_routing.clone(),
            document.default_tier.clone(),
            document.tie_break,
        )?;

        for (origin, tier) in engine.referenced_tiers() {
            if !registry.contains(tier) {
                return Err(RouterError::invalid(format!(
                    "{} references unknown tier '{}'",
                    origin, tier
                )));
            }
        }

        if let Some((intent, _)) = document.intent_limits.iter().find(|(_, limit)| **limit == 0) {
            return Err(RouterError::invalid(format!(
                "intent limit for '{}' must be positive",
                intent
            )));
        }

        let mut router = Self::new(registry, engine, health)
            .with_intent_limits(document.intent_limits.clone());
        router.intent_routing = document.intent_routing.clone();

        info!(
            tiers = router.registry.len(),
            rules = router.engine.rules().len(),
            default_tier = %router.engine.default_tier(),
            tie_break = ?router.engine.tie_break(),
            "Routing policy loaded"
        );

        Ok(router)
    }

    /// Route a request
    pub async fn route(&self, context: &RequestContext) -> RouterResult<RoutingDecision> {
        let selection = self.engine.evaluate(context);

        let tier = self.registry.resolve(&selection.tier_name).map_err(|e| {
            error!(
                tier = %selection.tier_name,
                reason = %selection.reason,
                "Routing policy references an unknown tier"
            );
            e
        })?;

        let selected_model = self.select_model(tier).await?;
        let max_output_tokens = self.output_budget(tier, context);

        let decision = RoutingDecision {
            tier: tier.clone(),
            selected_model,
            max_output_tokens,
            max_input_tokens: tier.max_input_tokens,
            reason: selection.reason,
        };

        if decision.input_exceeds_limit(context.input_token_estimate) {
            warn!(
                tier = %tier.name,
                input_tokens = context.input_token_estimate,
                max_input_tokens = tier.max_input_tokens,
                "Input estimate exceeds tier input ceiling"
            );
        }

        info!(
            intent = %context.intent,
            tier = %decision.tier.name,
            model = %decision.selected_model,
            max_output_tokens = decision.max_output_tokens,
            retry_count = context.retry_count,
            reason = %decision.reason,
            "Routing decision"
        );

        Ok(decision)
    }

    /// Model and output budget for a bare request of the given intent
    pub async fn model_for_intent(&self, intent: &str) -> RouterResult<(String, u32)> {
        let decision = self.route(&RequestContext::new(intent)).await?;
        Ok((decision.selected_model, decision.max_output_tokens))
    }

    /// First healthy candidate in preference order
    async fn select_model(&self, tier: &Tier) -> RouterResult<String> {
        for model in &tier.candidate_models {
            match self.health.is_healthy(model).await {
                Ok(true) => return Ok(model.clone()),
                Ok(false) => {
                    debug!(tier = %tier.name, model = %model, "Skipping unhealthy model");
                }
                Err(e) => {
                    warn!(
                        tier = %tier.name,
                        model = %model,
                        error = %e,
                        "Health probe failed, treating model as unhealthy"
                    );
                }
            }
        }

        warn!(
            tier = %tier.name,
            total_models = tier.candidate_models.len(),
            "All models unavailable for tier"
        );

        Err(RouterError::NoHealthyModel {
            tier: tier.name.clone(),
            candidates: tier.candidate_models.clone(),
        })
    }

    fn output_budget(&self, tier: &Tier, context: &RequestContext) -> u32 {
        let requested = context
            .requested_max_output_tokens
            .unwrap_or(tier.max_output_tokens);
        let intent_cap = self
            .intent_limits
            .get(&context.intent.to_ascii_lowercase())
            .copied()
            .unwrap_or(u32::MAX);

        requested.min(tier.max_output_tokens).min(intent_cap)
    }

    pub fn registry(&self) -> &TierRegistry {
        &self.registry
    }

    /// Whether the model is a candidate of any tier in this policy
    pub fn knows_model(&self, model: &str) -> bool {
        self.registry.knows_model(model)
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Snapshot of the loaded policy for inspection
    pub fn summary(&self) -> PolicySummary {
        let tiers = self
            .registry
            .tier_names()
            .into_iter()
            .filter_map(|name| self.registry.resolve(name).ok().cloned())
            .collect();

        PolicySummary {
            default_tier: self.engine.default_tier().to_string(),
            tie_break: self.engine.tie_break(),
            tiers,
            rules: self.engine.rules().iter().map(|r| r.name.clone()).collect(),
            intent_routing: self.intent_routing.clone(),
            intent_limits: self.intent_limits.clone(),
        }
    }
}
