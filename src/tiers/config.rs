//! Routing policy document
//!
//! The policy is a data-only document (TOML or JSON) describing tiers, rules,
//! intent routing, token caps and pricing. It is parsed once and turned into
//! an immutable `ModelRouter`; reloading means parsing it again.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RouterError, RouterResult};
use crate::usage::cost::ModelPrice;

use super::rules::{Comparison, Condition, FlagField, NumericField, RoutingRule, RuleKind, TieBreak};

/// Tier used when no rule and no intent mapping matches
pub const DEFAULT_TIER: &str = "cheap_general";

/// Names of the tiers in the reference policy
pub mod tier_names {
    pub const CHEAP_GENERAL: &str = "cheap_general";
    pub const STRUCTURED: &str = "structured";
    pub const FALLBACK: &str = "fallback";
    pub const SENSITIVE: &str = "sensitive";
}

/// Input estimate above which the reference policy leaves the cheap tier
pub const LARGE_INPUT_THRESHOLD: u64 = 4000;

/// Retry count above which the reference policy escalates to the fallback tier
pub const RETRY_ESCALATION_THRESHOLD: u64 = 1;

fn default_tier_name() -> String {
    DEFAULT_TIER.to_string()
}

fn default_max_input_tokens() -> u32 {
    4000
}

fn default_max_output_tokens() -> u32 {
    1024
}

/// One tier as written in the policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    /// Candidate models in preference order
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl TierSpec {
    pub fn new(models: &[&str], max_input_tokens: u32, max_output_tokens: u32) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            max_input_tokens,
            max_output_tokens,
        }
    }
}

/// Full routing policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Tier returned when nothing else matches
    #[serde(default = "default_tier_name")]
    pub default_tier: String,
    /// Which of sensitive content and retry escalation wins when both match
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Tier name -> tier definition
    #[serde(default)]
    pub tiers: BTreeMap<String, TierSpec>,
    /// Intent -> preferred tier, consulted after the rules
    #[serde(default)]
    pub intent_routing: BTreeMap<String, String>,
    /// Intent -> output token cap
    #[serde(default)]
    pub intent_limits: BTreeMap<String, u32>,
    /// Model -> absolute output token ceiling
    #[serde(default)]
    pub model_limits: BTreeMap<String, u32>,
    /// Model id fragment -> price per million tokens
    #[serde(default)]
    pub pricing: BTreeMap<String, ModelPrice>,
    /// Ordered routing rules; first match wins
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

impl PolicyDocument {
    /// Parse a TOML policy document
    pub fn from_toml_str(input: &str) -> RouterResult<Self> {
        toml::from_str(input)
            .map_err(|e| RouterError::invalid(format!("failed to parse TOML policy: {}", e)))
    }

    /// Parse a JSON policy document
    pub fn from_json_str(input: &str) -> RouterResult<Self> {
        serde_json::from_str(input)
            .map_err(|e| RouterError::invalid(format!("failed to parse JSON policy: {}", e)))
    }

    /// Read a policy file, picking the format from its extension
    pub fn from_path(path: &Path) -> RouterResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            RouterError::invalid(format!("failed to read policy {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            other => Err(RouterError::invalid(format!(
                "unsupported policy format {:?} for {} (expected .toml or .json)",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    /// The reference cost-first policy
    ///
    /// Rule order: structured output, large input, retry escalation,
    /// sensitive content, then the `cheap_general` default.
    pub fn reference() -> Self {
        use tier_names::*;

        let tiers = BTreeMap::from([
            (
                CHEAP_GENERAL.to_string(),
                TierSpec::new(
                    &["deepseek/deepseek-chat", "groq/llama-3.3-70b-versatile"],
                    4000,
                    1024,
                ),
            ),
            (
                STRUCTURED.to_string(),
                TierSpec::new(
                    &["anthropic/claude-3-haiku-20240307", "openai/gpt-4o-mini"],
                    8000,
                    2048,
                ),
            ),
            (
                FALLBACK.to_string(),
                TierSpec::new(
                    &["openai/gpt-4o-mini", "anthropic/claude-3-haiku-20240307"],
                    16000,
                    4096,
                ),
            ),
            (
                SENSITIVE.to_string(),
                TierSpec::new(&["anthropic/claude-3-haiku-20240307"], 8000, 2048),
            ),
        ]);

        let rules = vec![
            RoutingRule {
                name: "json_required".to_string(),
                kind: RuleKind::StructuredOutput,
                condition: Condition::Flag {
                    flag: FlagField::NeedsStructuredOutput,
                    value: true,
                },
                target_tier: STRUCTURED.to_string(),
            },
            RoutingRule {
                name: "large_input".to_string(),
                kind: RuleKind::LargeInput,
                condition: Condition::Threshold {
                    field: NumericField::InputTokenEstimate,
                    op: Comparison::Gt,
                    value: LARGE_INPUT_THRESHOLD,
                },
                target_tier: STRUCTURED.to_string(),
            },
            RoutingRule {
                name: "retry_escalation".to_string(),
                kind: RuleKind::RetryEscalation,
                condition: Condition::Threshold {
                    field: NumericField::RetryCount,
                    op: Comparison::Gt,
                    value: RETRY_ESCALATION_THRESHOLD,
                },
                target_tier: FALLBACK.to_string(),
            },
            RoutingRule {
                name: "sensitive_content".to_string(),
                kind: RuleKind::SensitiveContent,
                condition: Condition::Flag {
                    flag: FlagField::Sensitivity,
                    value: true,
                },
                target_tier: SENSITIVE.to_string(),
            },
        ];

        let intent_limits = [
            ("translate", 512),
            ("summarize", 256),
            ("format", 256),
            ("format_whatsapp", 256),
            ("format_telegram", 512),
            ("pii_redact", 1024),
            ("search", 512),
            ("general", 1024),
        ]
        .into_iter()
        .map(|(intent, limit)| (intent.to_string(), limit))
        .collect();

        let model_limits = [
            ("deepseek/deepseek-chat", 8192),
            ("groq/llama-3.3-70b-versatile", 32768),
            ("anthropic/claude-3-haiku-20240307", 4096),
            ("openai/gpt-4o-mini", 16384),
        ]
        .into_iter()
        .map(|(model, limit)| (model.to_string(), limit))
        .collect();

        let pricing = [
            ("deepseek", ModelPrice::new(0.14, 0.28)),
            ("haiku", ModelPrice::new(0.25, 1.25)),
            ("gpt-4o-mini", ModelPrice::new(0.15, 0.60)),
            ("groq", ModelPrice::new(0.0, 0.0)),
        ]
        .into_iter()
        .map(|(fragment, price)| (fragment.to_string(), price))
        .collect();

        Self {
            default_tier: DEFAULT_TIER.to_string(),
            tie_break: TieBreak::default(),
            tiers,
            intent_routing: BTreeMap::from([(
                "extraction".to_string(),
                STRUCTURED.to_string(),
            )]),
            intent_limits,
            model_limits,
            pricing,
            rules,
        }
    }
}

/// Where the routing policy comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    /// A TOML or JSON file on disk
    File(PathBuf),
    /// The compiled-in reference policy
    BuiltIn,
}

impl PolicySource {
    /// Resolve the policy source
    ///
    /// An explicit path always wins. Otherwise `configs/policy-{profile}.toml`
    /// and then `.json` are tried, falling back to the built-in policy.
    pub fn discover(explicit: Option<PathBuf>, profile: &str) -> Self {
        if let Some(path) = explicit {
            return PolicySource::File(path);
        }

        let candidates = [
            PathBuf::from(format!("configs/policy-{}.toml", profile)),
            PathBuf::from(format!("configs/policy-{}.json", profile)),
        ];

        for path in candidates {
            if path.exists() {
                debug!(path = %path.display(), "Discovered policy file");
                return PolicySource::File(path);
            }
        }

        PolicySource::BuiltIn
    }

    /// Load the policy document
    pub fn load(&self) -> RouterResult<PolicyDocument> {
        match self {
            PolicySource::File(path) => {
                let document = PolicyDocument::from_path(path)?;
                info!(
                    path = %path.display(),
                    tiers = document.tiers.len(),
                    rules = document.rules.len(),
                    "Loaded routing policy"
                );
                Ok(document)
            }
            PolicySource::BuiltIn => {
                info!("Using built-in reference routing policy");
                Ok(PolicyDocument::reference())
            }
        }
    }

    /// Human-readable description for logs and the policy endpoint
    pub fn describe(&self) -> String {
        match self {
            PolicySource::File(path) => path.display().to_string(),
            PolicySource::BuiltIn => "built-in".to_string(),
        }
    }
}
