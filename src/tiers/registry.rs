//! Tier registry
//!
//! Static mapping from tier name to candidate models and token ceilings.
//! Validated once at load; a registry either builds completely or not at all.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{RouterError, RouterResult};

use super::config::TierSpec;
use super::types::Tier;

/// Read-only tier registry
#[derive(Debug, Clone)]
pub struct TierRegistry {
    tiers: HashMap<String, Tier>,
    default_tier: String,
}

impl TierRegistry {
    /// Build a registry without per-model output ceilings
    pub fn new(tiers: Vec<Tier>, default_tier: impl Into<String>) -> RouterResult<Self> {
        Self::with_model_limits(tiers, default_tier, &BTreeMap::new())
    }

    /// Build a registry, checking each tier's output ceiling against the
    /// absolute ceilings of its candidate models
    pub fn with_model_limits(
        tiers: Vec<Tier>,
        default_tier: impl Into<String>,
        model_limits: &BTreeMap<String, u32>,
    ) -> RouterResult<Self> {
        let default_tier = default_tier.into();
        let mut by_name = HashMap::with_capacity(tiers.len());

        for tier in tiers {
            validate_tier(&tier, model_limits)?;
            if by_name.contains_key(&tier.name) {
                return Err(RouterError::invalid(format!(
                    "duplicate tier '{}'",
                    tier.name
                )));
            }
            by_name.insert(tier.name.clone(), tier);
        }

        if !by_name.contains_key(&default_tier) {
            return Err(RouterError::invalid(format!(
                "default tier '{}' is not defined",
                default_tier
            )));
        }

        Ok(Self {
            tiers: by_name,
            default_tier,
        })
    }

    /// Build from policy document tier specs
    pub fn from_specs(
        specs: &BTreeMap<String, TierSpec>,
        default_tier: &str,
        model_limits: &BTreeMap<String, u32>,
    ) -> RouterResult<Self> {
        let tiers = specs
            .iter()
            .map(|(name, spec)| Tier {
                name: name.clone(),
                candidate_models: spec.models.clone(),
                max_input_tokens: spec.max_input_tokens,
                max_output_tokens: spec.max_output_tokens,
            })
            .collect();
        Self::with_model_limits(tiers, default_tier, model_limits)
    }

    /// Look up a tier by name
    pub fn resolve(&self, tier_name: &str) -> RouterResult<&Tier> {
        self.tiers
            .get(tier_name)
            .ok_or_else(|| RouterError::UnknownTier(tier_name.to_string()))
    }

    /// The tier used when nothing else matches; always present
    pub fn default_tier(&self) -> &Tier {
        // Presence is checked in the constructor
        &self.tiers[&self.default_tier]
    }

    pub fn contains(&self, tier_name: &str) -> bool {
        self.tiers.contains_key(tier_name)
    }

    /// Whether any tier lists the model as a candidate
    pub fn knows_model(&self, model: &str) -> bool {
        self.tiers
            .values()
            .any(|tier| tier.candidate_models.iter().any(|m| m == model))
    }

    /// Tier names in sorted order
    pub fn tier_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tiers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

fn validate_tier(tier: &Tier, model_limits: &BTreeMap<String, u32>) -> RouterResult<()> {
    if tier.name.trim().is_empty() {
        return Err(RouterError::invalid("tier names must not be empty"));
    }
    if tier.candidate_models.is_empty() {
        return Err(RouterError::invalid(format!(
            "tier '{}' has no candidate models",
            tier.name
        )));
    }
    if tier.max_input_tokens == 0 || tier.max_output_tokens == 0 {
        return Err(RouterError::invalid(format!(
            "tier '{}' must have positive token ceilings (input {}, output {})",
            tier.name, tier.max_input_tokens, tier.max_output_tokens
        )));
    }

    let mut seen = HashSet::new();
    for model in &tier.candidate_models {
        if model.trim().is_empty() {
            return Err(RouterError::invalid(format!(
                "tier '{}' lists an empty model id",
                tier.name
            )));
        }
        if !seen.insert(model.as_str()) {
            return Err(RouterError::invalid(format!(
                "tier '{}' lists model '{}' twice",
                tier.name, model
            )));
        }
        if let Some(&ceiling) = model_limits.get(model) {
            if tier.max_output_tokens > ceiling {
                return Err(RouterError::invalid(format!(
                    "tier '{}' allows {} output tokens but model '{}' is capped at {}",
                    tier.name, tier.max_output_tokens, model, ceiling
                )));
            }
        }
    }

    Ok(())
}
