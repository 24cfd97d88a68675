//! Routing scenario tests
//!
//! Exercise the router through the public library API with the reference
//! policy and a static health check.

use std::collections::BTreeMap;
use std::sync::Arc;

use costroute::tiers::{
    Condition, DecisionReason, FlagField, HealthCheck, ModelHealthTracker, ModelRouter,
    PolicyDocument, PolicySource, RequestContext, RoutingRule, RuleEngine, RuleKind,
    StaticHealthCheck, TieBreak, TierRegistry, TierSpec,
};
use costroute::RouterError;
use pretty_assertions::assert_eq;

use crate::common::{models, reference_policy_with};

fn router_with(document: &PolicyDocument, health: impl HealthCheck + 'static) -> ModelRouter {
    ModelRouter::from_document(document, Arc::new(health)).expect("reference policy is valid")
}

fn reference_router() -> ModelRouter {
    router_with(&PolicyDocument::reference(), StaticHealthCheck::all_healthy())
}

// =============================================================================
// Tests: Rule precedence
// =============================================================================

#[tokio::test]
async fn test_structured_output_routes_to_structured_tier() {
    let router = reference_router();
    let context = RequestContext::new("extraction").with_structured_output(true);

    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.tier_name(), "structured");
    assert_eq!(decision.selected_model, models::HAIKU);
    assert_eq!(decision.reason, DecisionReason::Rule("json_required".to_string()));
}

#[tokio::test]
async fn test_large_input_routes_to_structured_tier() {
    let router = reference_router();
    let context = RequestContext::new("summarize").with_input_tokens(5000);

    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.tier_name(), "structured");
    assert_eq!(decision.reason, DecisionReason::Rule("large_input".to_string()));
    assert_eq!(decision.max_input_tokens, 8000);
}

#[tokio::test]
async fn test_input_at_threshold_stays_cheap() {
    let router = reference_router();
    let context = RequestContext::new("general").with_input_tokens(4000);

    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.tier_name(), "cheap_general");
}

#[tokio::test]
async fn test_second_retry_escalates_to_fallback() {
    let router = reference_router();

    let first_retry = RequestContext::new("general").with_retry_count(1);
    let decision = router.route(&first_retry).await.unwrap();
    assert_eq!(decision.tier_name(), "cheap_general");

    let second_retry = first_retry.next_attempt();
    let decision = router.route(&second_retry).await.unwrap();
    assert_eq!(decision.tier_name(), "fallback");
    assert_eq!(decision.selected_model, models::GPT4O_MINI);
    assert_eq!(decision.reason, DecisionReason::Rule("retry_escalation".to_string()));
}

#[tokio::test]
async fn test_structured_output_beats_retry_escalation() {
    let router = reference_router();
    let context = RequestContext::new("extraction")
        .with_structured_output(true)
        .with_retry_count(2);

    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.tier_name(), "structured");
}

#[tokio::test]
async fn test_small_translation_uses_cheap_default() {
    let router = reference_router();
    let context = RequestContext::new("translation").with_input_tokens(300);

    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.tier_name(), "cheap_general");
    assert_eq!(decision.selected_model, models::DEEPSEEK);
    assert_eq!(decision.reason, DecisionReason::Default);
}

#[tokio::test]
async fn test_intent_routing_applies_after_rules() {
    let router = reference_router();

    let decision = router.route(&RequestContext::new("Extraction")).await.unwrap();

    assert_eq!(decision.tier_name(), "structured");
    assert_eq!(decision.reason, DecisionReason::Intent("Extraction".to_string()));
}

#[tokio::test]
async fn test_sensitive_content_routes_to_sensitive_tier() {
    let router = reference_router();
    let context = RequestContext::new("general").with_sensitivity(true);

    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.tier_name(), "sensitive");
    assert_eq!(decision.selected_model, models::HAIKU);
}

// =============================================================================
// Tests: Sensitive/retry tie-break
// =============================================================================

#[tokio::test]
async fn test_escalate_tie_break_moves_failed_sensitive_request_to_fallback() {
    let router = router_with(
        &reference_policy_with(TieBreak::Escalate),
        StaticHealthCheck::all_healthy(),
    );
    let context = RequestContext::new("general")
        .with_sensitivity(true)
        .with_retry_count(2);

    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.tier_name(), "fallback");
}

#[tokio::test]
async fn test_keep_sensitive_tie_break_stays_in_sensitive_tier() {
    let router = router_with(
        &reference_policy_with(TieBreak::KeepSensitive),
        StaticHealthCheck::all_healthy(),
    );
    let context = RequestContext::new("general")
        .with_sensitivity(true)
        .with_retry_count(2);

    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.tier_name(), "sensitive");
    assert_eq!(
        decision.reason,
        DecisionReason::Rule("sensitive_content".to_string())
    );
}

#[tokio::test]
async fn test_tie_break_ignores_rule_order() {
    let mut document = reference_policy_with(TieBreak::Escalate);
    // Put sensitive_content ahead of retry_escalation
    let sensitive = document.rules.pop().unwrap();
    document.rules.insert(0, sensitive);
    let router = router_with(&document, StaticHealthCheck::all_healthy());

    let context = RequestContext::new("general")
        .with_sensitivity(true)
        .with_retry_count(3);
    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.tier_name(), "fallback");
}

// =============================================================================
// Tests: Budgets, determinism and health
// =============================================================================

#[tokio::test]
async fn test_requested_output_clamped_to_tier_ceiling() {
    let router = reference_router();
    let context = RequestContext::new("translation").with_requested_output_tokens(5000);

    let decision = router.route(&context).await.unwrap();

    assert_eq!(decision.max_output_tokens, 1024);
}

#[tokio::test]
async fn test_smaller_request_kept_and_intent_cap_applied() {
    let router = reference_router();

    let context = RequestContext::new("translation").with_requested_output_tokens(200);
    assert_eq!(router.route(&context).await.unwrap().max_output_tokens, 200);

    let context = RequestContext::new("summarize");
    assert_eq!(router.route(&context).await.unwrap().max_output_tokens, 256);
}

#[tokio::test]
async fn test_routing_is_deterministic() {
    let router = reference_router();
    let context = RequestContext::new("general")
        .with_input_tokens(1200)
        .with_retry_count(1);

    let first = router.route(&context).await.unwrap();
    for _ in 0..50 {
        assert_eq!(router.route(&context).await.unwrap(), first);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_routing_agrees() {
    let router = Arc::new(reference_router());
    let context = RequestContext::new("extraction")
        .with_input_tokens(6000)
        .with_retry_count(2);
    let expected = router.route(&context).await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..64 {
        let router = router.clone();
        let context = context.clone();
        tasks.spawn(async move { router.route(&context).await });
    }

    let mut completed = 0;
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap(), expected);
        completed += 1;
    }
    assert_eq!(completed, 64);
}

#[tokio::test]
async fn test_unhealthy_first_choice_falls_through() {
    let router = router_with(
        &PolicyDocument::reference(),
        StaticHealthCheck::with_unhealthy([models::DEEPSEEK]),
    );

    let decision = router.route(&RequestContext::new("general")).await.unwrap();

    assert_eq!(decision.tier_name(), "cheap_general");
    assert_eq!(decision.selected_model, models::GROQ);
}

#[tokio::test]
async fn test_no_healthy_model_in_tier() {
    let router = router_with(
        &PolicyDocument::reference(),
        StaticHealthCheck::with_unhealthy([models::DEEPSEEK]).with_probe_timeouts([models::GROQ]),
    );

    let err = router.route(&RequestContext::new("general")).await.unwrap_err();

    assert_eq!(
        err,
        RouterError::NoHealthyModel {
            tier: "cheap_general".to_string(),
            candidates: vec![models::DEEPSEEK.to_string(), models::GROQ.to_string()],
        }
    );
}

#[tokio::test]
async fn test_health_tracker_feedback_changes_selection() {
    let tracker = Arc::new(ModelHealthTracker::new());
    let router = ModelRouter::from_document(&PolicyDocument::reference(), tracker.clone()).unwrap();

    tracker.record_failure(models::DEEPSEEK);
    let decision = router.route(&RequestContext::new("general")).await.unwrap();
    assert_eq!(decision.selected_model, models::GROQ);

    tracker.record_success(models::DEEPSEEK);
    let decision = router.route(&RequestContext::new("general")).await.unwrap();
    assert_eq!(decision.selected_model, models::DEEPSEEK);
}

#[tokio::test]
async fn test_rule_to_missing_tier_fails_with_unknown_tier() {
    let specs = BTreeMap::from([(
        "cheap_general".to_string(),
        TierSpec::new(&[models::DEEPSEEK], 4000, 1024),
    )]);
    let registry = TierRegistry::from_specs(&specs, "cheap_general", &BTreeMap::new()).unwrap();
    let engine = RuleEngine::new(
        vec![RoutingRule::new(
            "to_ghost",
            RuleKind::Custom,
            Condition::Flag {
                flag: FlagField::Sensitivity,
                value: true,
            },
            "ghost",
        )],
        BTreeMap::new(),
        "cheap_general",
        TieBreak::Escalate,
    )
    .unwrap();
    let router = ModelRouter::new(registry, engine, Arc::new(StaticHealthCheck::all_healthy()));

    let err = router
        .route(&RequestContext::new("general").with_sensitivity(true))
        .await
        .unwrap_err();
    assert_eq!(err, RouterError::UnknownTier("ghost".to_string()));

    // Requests that do not hit the broken rule still route
    let decision = router.route(&RequestContext::new("general")).await.unwrap();
    assert_eq!(decision.tier_name(), "cheap_general");
}

// =============================================================================
// Tests: Policy files
// =============================================================================

#[tokio::test]
async fn test_shipped_policy_file_routes_like_reference() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/policy-default.toml");
    let document = PolicySource::File(path).load().unwrap();
    let router = router_with(&document, StaticHealthCheck::all_healthy());

    let context = RequestContext::new("general").with_retry_count(2);
    assert_eq!(router.route(&context).await.unwrap().tier_name(), "fallback");
}

#[tokio::test]
async fn test_json_policy_document() {
    let document = PolicyDocument::from_json_str(
        r#"{
            "default_tier": "cheap",
            "tiers": {
                "cheap": { "models": ["m/small"], "max_input_tokens": 2000, "max_output_tokens": 512 },
                "big": { "models": ["m/large"], "max_input_tokens": 32000, "max_output_tokens": 4096 }
            },
            "rules": [
                {
                    "name": "long_translation",
                    "tier": "big",
                    "condition": {
                        "type": "all",
                        "conditions": [
                            { "type": "intent", "equals": "translation" },
                            { "type": "threshold", "field": "input_token_estimate", "op": "ge", "value": 1500 }
                        ]
                    }
                }
            ]
        }"#,
    )
    .unwrap();
    let router = router_with(&document, StaticHealthCheck::all_healthy());

    let long = RequestContext::new("translation").with_input_tokens(1500);
    assert_eq!(router.route(&long).await.unwrap().selected_model, "m/large");

    let short = RequestContext::new("translation").with_input_tokens(1499);
    assert_eq!(router.route(&short).await.unwrap().selected_model, "m/small");
}

#[test]
fn test_policy_with_rule_to_missing_tier_rejected_at_load() {
    let mut document = PolicyDocument::reference();
    document.rules[0].target_tier = "ghost".to_string();

    let result = ModelRouter::from_document(&document, Arc::new(StaticHealthCheck::all_healthy()));

    assert!(matches!(result, Err(RouterError::InvalidConfiguration(_))));
}
