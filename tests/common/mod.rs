//! Common test utilities for Costroute
//!
//! Shared fixtures and a harness that serves the real application router
//! through `axum-test`, without Redis.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum_test::TestServer;
use costroute::{
    routes, AppState, Config, CostTable, ModelHealthTracker, ModelRouter,
    PolicyDocument, PolicySource,
};

/// Model ids of the reference policy
pub mod models {
    pub const DEEPSEEK: &str = "deepseek/deepseek-chat";
    pub const GROQ: &str = "groq/llama-3.3-70b-versatile";
    pub const HAIKU: &str = "anthropic/claude-3-haiku-20240307";
    pub const GPT4O_MINI: &str = "openai/gpt-4o-mini";
}

/// Config tuned for tests: fast usage flushes, no Redis
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        usage_flush_interval_ms: 10,
        ..Config::default()
    }
}

/// Policy file in the temp directory, removed on drop
pub struct TempPolicy {
    pub path: PathBuf,
}

impl TempPolicy {
    pub fn new(extension: &str, contents: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "costroute-policy-{}.{}",
            uuid::Uuid::new_v4(),
            extension
        ));
        std::fs::write(&path, contents).expect("Failed to write temp policy");
        Self { path }
    }

    pub fn overwrite(&self, contents: &str) {
        std::fs::write(&self.path, contents).expect("Failed to overwrite temp policy");
    }
}

impl Drop for TempPolicy {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Reference policy with the given tie-break
pub fn reference_policy_with(tie_break: costroute::tiers::TieBreak) -> PolicyDocument {
    PolicyDocument {
        tie_break,
        ..PolicyDocument::reference()
    }
}

/// Test harness serving the application router
pub struct TestHarness {
    pub server: TestServer,
    pub state: Arc<AppState>,
}

impl TestHarness {
    /// Harness over the built-in reference policy
    pub fn reference() -> Self {
        Self::with_document(PolicySource::BuiltIn, &PolicyDocument::reference())
    }

    /// Harness over an in-memory policy document
    pub fn with_document(source: PolicySource, document: &PolicyDocument) -> Self {
        let state = AppState::with_document(test_config(), source, document, None)
            .expect("Failed to build app state");
        Self::from_state(state)
    }

    /// Harness over a policy file, loaded the same way as at startup
    pub fn with_policy_file(policy: &TempPolicy) -> Self {
        let source = PolicySource::File(policy.path.clone());
        let document = source.load().expect("Failed to load policy file");
        Self::with_document(source, &document)
    }

    /// Harness over a prebuilt router
    pub fn with_router(router: ModelRouter, health_tracker: Arc<ModelHealthTracker>) -> Self {
        let state = AppState::from_parts(
            test_config(),
            PolicySource::BuiltIn,
            router,
            health_tracker,
            CostTable::default(),
            None,
        );
        Self::from_state(state)
    }

    fn from_state(state: AppState) -> Self {
        let state = Arc::new(state);
        let app = routes::create_router(state.clone());
        let server = TestServer::new(app).expect("Failed to create test server");
        Self { server, state }
    }
}
