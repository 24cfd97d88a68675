//! Configuration management for Costroute
//!
//! Service configuration is loaded from environment variables. The routing
//! policy itself lives in a separate document (see `tiers::config`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::tiers::{HealthConfig, PolicySource};
use crate::usage::BatchingConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Explicit policy file (TOML or JSON)
    pub policy_path: Option<PathBuf>,
    /// Profile used for policy discovery (`configs/policy-{profile}.toml`)
    pub profile: String,

    /// Redis connection URL; usage counters are only mirrored to Redis when set
    pub redis_url: Option<String>,

    /// Backoff applied to a model after its first failure (in seconds)
    pub health_initial_backoff_secs: u64,
    /// Upper bound on model backoff (in seconds)
    pub health_max_backoff_secs: u64,

    /// Usage flush interval (in milliseconds)
    pub usage_flush_interval_ms: u64,
    /// Usage channel capacity
    pub usage_channel_buffer: usize,

    /// Per-request timeout for the HTTP surface (in seconds)
    pub request_timeout_secs: u64,

    /// Enable debug logging of full decisions
    pub debug_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            policy_path: None,
            profile: "default".to_string(),
            redis_url: None,
            health_initial_backoff_secs: 30,
            health_max_backoff_secs: 300,
            usage_flush_interval_ms: 500,
            usage_channel_buffer: 10_000,
            request_timeout_secs: 30,
            debug_enabled: false,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            host: env::var("COSTROUTE_HOST").unwrap_or(defaults.host),
            port: parse_var("COSTROUTE_PORT", defaults.port)?,

            policy_path: env::var("COSTROUTE_POLICY_PATH").ok().map(PathBuf::from),
            profile: env::var("COSTROUTE_PROFILE").unwrap_or(defaults.profile),

            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),

            health_initial_backoff_secs: parse_var(
                "HEALTH_INITIAL_BACKOFF_SECS",
                defaults.health_initial_backoff_secs,
            )?,
            health_max_backoff_secs: parse_var(
                "HEALTH_MAX_BACKOFF_SECS",
                defaults.health_max_backoff_secs,
            )?,

            usage_flush_interval_ms: parse_var(
                "USAGE_FLUSH_INTERVAL_MS",
                defaults.usage_flush_interval_ms,
            )?,
            usage_channel_buffer: parse_var("USAGE_CHANNEL_BUFFER", defaults.usage_channel_buffer)?,

            request_timeout_secs: parse_var(
                "COSTROUTE_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,

            debug_enabled: env::var("COSTROUTE_DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// Where the routing policy is loaded from
    pub fn policy_source(&self) -> PolicySource {
        PolicySource::discover(self.policy_path.clone(), &self.profile)
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            initial_backoff: Duration::from_secs(self.health_initial_backoff_secs),
            max_backoff: Duration::from_secs(
                self.health_max_backoff_secs.max(self.health_initial_backoff_secs),
            ),
            ..HealthConfig::default()
        }
    }

    pub fn batching_config(&self) -> BatchingConfig {
        BatchingConfig {
            flush_interval: Duration::from_millis(self.usage_flush_interval_ms),
            channel_buffer: self.usage_channel_buffer,
            ..BatchingConfig::default()
        }
    }
}
