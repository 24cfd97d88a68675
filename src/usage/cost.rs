//! Cost estimation
//!
//! Prices are USD per million tokens, matched against model ids by
//! substring. The longest matching fragment wins so that, for example,
//! "gpt-4o-mini" beats a broader "gpt-4o" entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Price per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }
}

/// Conservative price for models with no pricing entry
pub const UNKNOWN_MODEL_PRICE: ModelPrice = ModelPrice::new(0.50, 1.50);

/// Lookup table from model id fragment to price
#[derive(Debug, Clone)]
pub struct CostTable {
    entries: Vec<(String, ModelPrice)>,
    fallback: ModelPrice,
}

impl CostTable {
    /// Build from a policy `pricing` table
    pub fn new(pricing: &BTreeMap<String, ModelPrice>) -> Self {
        let mut entries: Vec<(String, ModelPrice)> = pricing
            .iter()
            .map(|(fragment, price)| (fragment.to_ascii_lowercase(), *price))
            .collect();
        // Longest fragment first; ties broken alphabetically for stability
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self {
            entries,
            fallback: UNKNOWN_MODEL_PRICE,
        }
    }

    /// Price for a model id
    pub fn price_for(&self, model: &str) -> ModelPrice {
        let model = model.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(fragment, _)| model.contains(fragment.as_str()))
            .map(|(_, price)| *price)
            .unwrap_or(self.fallback)
    }

    /// Estimated cost in USD, rounded to 6 decimals
    pub fn estimate(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let price = self.price_for(model);
        let cost = (input_tokens as f64 * price.input_per_million
            + output_tokens as f64 * price.output_per_million)
            / 1_000_000.0;
        round_to(cost, 6)
    }
}

impl Default for CostTable {
    fn default() -> Self {
        Self::new(&crate::tiers::PolicyDocument::reference().pricing)
    }
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
