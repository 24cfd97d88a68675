//! Tier routing module
//!
//! Maps request metadata to a tier and a concrete model: the policy
//! document, the tier registry, the rule engine, model health and the router
//! that ties them together.

pub mod config;
pub mod health;
pub mod registry;
pub mod router;
pub mod rules;
pub mod types;

pub use config::{PolicyDocument, PolicySource, TierSpec};
pub use health::{HealthCheck, HealthCheckError, HealthConfig, ModelHealthTracker, StaticHealthCheck};
pub use registry::TierRegistry;
pub use router::{ModelRouter, PolicySummary};
pub use rules::{Comparison, Condition, FlagField, NumericField, RoutingRule, RuleEngine, RuleKind, TieBreak};
pub use types::{DecisionReason, RequestContext, RoutingDecision, Tier};
