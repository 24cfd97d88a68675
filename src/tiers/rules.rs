//! Routing rule engine
//!
//! Rules are typed, data-only condition -> tier pairs evaluated in configured
//! order against a `RequestContext`. Evaluation is a pure function of the
//! context and the static rule list: no randomness, no cross-request state.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{RouterError, RouterResult};

use super::types::{DecisionReason, RequestContext};

fn default_true() -> bool {
    true
}

/// Numeric context fields a threshold can compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    InputTokenEstimate,
    RetryCount,
}

impl NumericField {
    fn read(self, context: &RequestContext) -> u64 {
        match self {
            NumericField::InputTokenEstimate => context.input_token_estimate,
            NumericField::RetryCount => u64::from(context.retry_count),
        }
    }
}

/// Boolean context fields a flag condition can test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagField {
    NeedsStructuredOutput,
    Sensitivity,
}

impl FlagField {
    fn read(self, context: &RequestContext) -> bool {
        match self {
            FlagField::NeedsStructuredOutput => context.needs_structured_output,
            FlagField::Sensitivity => context.sensitivity,
        }
    }
}

/// Comparison operator for thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Comparison {
    fn apply(self, lhs: u64, rhs: u64) -> bool {
        match self {
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Eq => lhs == rhs,
        }
    }
}

/// Closed set of rule conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Intent equality (ASCII case-insensitive)
    Intent { equals: String },
    /// Numeric field compared against a constant
    Threshold {
        field: NumericField,
        op: Comparison,
        value: u64,
    },
    /// Boolean field equal to `value`
    Flag {
        flag: FlagField,
        #[serde(default = "default_true")]
        value: bool,
    },
    /// Every nested condition holds (an empty list always holds)
    All {
        #[serde(default)]
        conditions: Vec<Condition>,
    },
}

impl Condition {
    /// Evaluate against a request context
    pub fn matches(&self, context: &RequestContext) -> bool {
        match self {
            Condition::Intent { equals } => context.intent.eq_ignore_ascii_case(equals),
            Condition::Threshold { field, op, value } => op.apply(field.read(context), *value),
            Condition::Flag { flag, value } => flag.read(context) == *value,
            Condition::All { conditions } => conditions.iter().all(|c| c.matches(context)),
        }
    }

    fn validate(&self, rule: &str) -> RouterResult<()> {
        match self {
            Condition::Intent { equals } if equals.trim().is_empty() => Err(RouterError::invalid(
                format!("rule '{}' has an empty intent condition", rule),
            )),
            Condition::Threshold {
                field: NumericField::RetryCount,
                value,
                ..
            } if *value > u64::from(u32::MAX) => Err(RouterError::invalid(format!(
                "rule '{}' compares retry_count against out-of-range value {}",
                rule, value
            ))),
            Condition::All { conditions } => {
                conditions.iter().try_for_each(|c| c.validate(rule))
            }
            _ => Ok(()),
        }
    }
}

/// What a rule is for
///
/// Only `RetryEscalation` and `SensitiveContent` carry behaviour (the
/// tie-break); the other kinds are descriptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    StructuredOutput,
    LargeInput,
    RetryEscalation,
    SensitiveContent,
    #[default]
    Custom,
}

/// Winner when a request matches both a retry-escalation and a
/// sensitive-content rule, regardless of their list order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Retry escalation wins; a failed sensitive request moves to the fallback tier
    #[default]
    Escalate,
    /// Sensitive content wins; the request stays in the sensitive tier
    KeepSensitive,
}

/// A single condition -> tier rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Unique rule name
    pub name: String,
    #[serde(default)]
    pub kind: RuleKind,
    pub condition: Condition,
    /// Tier selected when the condition holds
    #[serde(rename = "tier")]
    pub target_tier: String,
}

impl RoutingRule {
    pub fn new(
        name: impl Into<String>,
        kind: RuleKind,
        condition: Condition,
        target_tier: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            condition,
            target_tier: target_tier.into(),
        }
    }

    pub fn matches(&self, context: &RequestContext) -> bool {
        self.condition.matches(context)
    }
}

/// Result of rule evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSelection {
    pub tier_name: String,
    pub reason: DecisionReason,
}

/// Ordered, immutable rule set
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<RoutingRule>,
    intent_routing: BTreeMap<String, String>,
    default_tier: String,
    tie_break: TieBreak,
}

impl RuleEngine {
    /// Build a rule engine, validating the rule list
    pub fn new(
        rules: Vec<RoutingRule>,
        intent_routing: BTreeMap<String, String>,
        default_tier: impl Into<String>,
        tie_break: TieBreak,
    ) -> RouterResult<Self> {
        let default_tier = default_tier.into();
        if default_tier.trim().is_empty() {
            return Err(RouterError::invalid("default tier name must not be empty"));
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.name.trim().is_empty() {
                return Err(RouterError::invalid("rule names must not be empty"));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(RouterError::invalid(format!(
                    "duplicate rule name '{}'",
                    rule.name
                )));
            }
            if rule.target_tier.trim().is_empty() {
                return Err(RouterError::invalid(format!(
                    "rule '{}' has no target tier",
                    rule.name
                )));
            }
            rule.condition.validate(&rule.name)?;
        }

        for (intent, tier) in &intent_routing {
            if tier.trim().is_empty() {
                return Err(RouterError::invalid(format!(
                    "intent '{}' maps to an empty tier name",
                    intent
                )));
            }
        }

        // Intent lookups are case-insensitive like intent conditions
        let intent_routing = intent_routing
            .into_iter()
            .map(|(intent, tier)| (intent.to_ascii_lowercase(), tier))
            .collect();

        Ok(Self {
            rules,
            intent_routing,
            default_tier,
            tie_break,
        })
    }

    /// Pick the tier name for a request
    ///
    /// Rules first (first match wins, subject to the sensitive/retry
    /// tie-break), then the intent routing table, then the default tier.
    pub fn evaluate(&self, context: &RequestContext) -> TierSelection {
        if let Some(first) = self.rules.iter().position(|rule| rule.matches(context)) {
            let winner = self.apply_tie_break(context, first);
            let rule = &self.rules[winner];
            return TierSelection {
                tier_name: rule.target_tier.clone(),
                reason: DecisionReason::Rule(rule.name.clone()),
            };
        }

        if let Some(tier) = self.intent_routing.get(&context.intent.to_ascii_lowercase()) {
            return TierSelection {
                tier_name: tier.clone(),
                reason: DecisionReason::Intent(context.intent.clone()),
            };
        }

        TierSelection {
            tier_name: self.default_tier.clone(),
            reason: DecisionReason::Default,
        }
    }

    fn apply_tie_break(&self, context: &RequestContext, first: usize) -> usize {
        let rival = match (self.rules[first].kind, self.tie_break) {
            (RuleKind::RetryEscalation, TieBreak::KeepSensitive) => RuleKind::SensitiveContent,
            (RuleKind::SensitiveContent, TieBreak::Escalate) => RuleKind::RetryEscalation,
            _ => return first,
        };

        self.rules
            .iter()
            .enumerate()
            .skip(first + 1)
            .find(|(_, rule)| rule.kind == rival && rule.matches(context))
            .map(|(index, _)| index)
            .unwrap_or(first)
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn default_tier(&self) -> &str {
        &self.default_tier
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Every tier name this engine can return, with where it is referenced
    pub fn referenced_tiers(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        let from_rules = self
            .rules
            .iter()
            .map(|rule| (format!("rule '{}'", rule.name), rule.target_tier.as_str()));
        let from_intents = self
            .intent_routing
            .iter()
            .map(|(intent, tier)| (format!("intent '{}'", intent), tier.as_str()));
        let default = std::iter::once(("default tier".to_string(), self.default_tier.as_str()));
        from_rules.chain(from_intents).chain(default)
    }
}
