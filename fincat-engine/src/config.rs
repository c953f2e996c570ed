//! Engine configuration
//!
//! Each setting resolves through three tiers, highest priority first:
//!
//! 1. Environment variable (`FINCAT_*`)
//! 2. TOML config file (see `fincat_common::config`)
//! 3. Built-in default
//!
//! When more than one tier supplies a value a warning names the winner
//! so surprising precedence is visible in the logs.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use fincat_common::config::TomlConfig;

use crate::error::{EngineError, Result};

/// Default system instructions sent with every classification request
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a financial transaction categorizer. \
For each transaction, assign exactly one category code from the provided taxonomy, \
a one-sentence rationale, and a confidence score between 0 and 1. \
Base your decision only on the transaction fields provided.";

/// Retry schedule for transient classifier failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Base delay before each retry; index 0 precedes attempt 2
    pub base_delays: Vec<Duration>,
    /// Jitter applied to each delay, as a fraction of the base
    pub jitter_pct: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delays: vec![Duration::from_millis(500), Duration::from_millis(2000)],
            jitter_pct: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Base delay before the retry following `attempt` (1-based)
    ///
    /// Attempts past the end of the schedule reuse the last delay.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let idx = (attempt.saturating_sub(1)) as usize;
        self.base_delays
            .get(idx)
            .or_else(|| self.base_delays.last())
            .copied()
            .unwrap_or(Duration::from_millis(500))
    }
}

/// Model endpoint settings that participate in the settings fingerprint
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub system_instructions: String,
}

/// Complete configuration for one categorization run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory of the page cache
    pub cache_dir: PathBuf,
    /// Exemplars per model request
    pub page_size: usize,
    /// Concurrent in-flight page requests
    pub concurrency: usize,
    /// Scores strictly above this auto-apply; at or below go to review
    pub confidence_threshold: f64,
    /// Abort the run on the first page failure instead of continuing
    pub stop_on_error: bool,
    /// Write prefilled duplicate categories back to the store
    pub persist_prefill: bool,
    pub retry: RetryPolicy,
    pub model: ModelSettings,
}

impl EngineConfig {
    /// Resolve configuration from environment, TOML, and defaults
    pub fn resolve(toml: &TomlConfig) -> Result<Self> {
        let cache_dir = resolve_string(
            "FINCAT_CACHE_DIR",
            toml.cache_dir.as_deref(),
            default_cache_dir().to_string_lossy().as_ref(),
        );
        let model = resolve_string("FINCAT_MODEL", toml.model.as_deref(), "gpt-4o-mini");
        let endpoint = resolve_string(
            "FINCAT_ENDPOINT",
            toml.endpoint.as_deref(),
            "https://api.openai.com/v1/responses",
        );
        let api_key = std::env::var("FINCAT_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| toml.api_key.clone());

        let page_size = resolve_usize("FINCAT_PAGE_SIZE", toml.page_size, 10)?;
        if page_size == 0 {
            return Err(EngineError::Config("page_size must be at least 1".into()));
        }
        let concurrency = resolve_usize("FINCAT_CONCURRENCY", toml.concurrency, 4)?;
        if concurrency == 0 {
            return Err(EngineError::Config("concurrency must be at least 1".into()));
        }

        Ok(Self {
            cache_dir: PathBuf::from(cache_dir),
            page_size,
            concurrency,
            confidence_threshold: 0.7,
            stop_on_error: false,
            persist_prefill: false,
            retry: RetryPolicy::default(),
            model: ModelSettings {
                model,
                endpoint,
                api_key,
                system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            },
        })
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fincat")
        .join("pages")
}

fn resolve_string(env_key: &str, toml_value: Option<&str>, default: &str) -> String {
    let env_value = std::env::var(env_key).ok().filter(|s| !s.is_empty());
    match (env_value, toml_value) {
        (Some(env), Some(toml)) => {
            if env != toml {
                warn!(
                    env_key,
                    "setting present in both environment and config file, environment wins"
                );
            }
            env
        }
        (Some(env), None) => env,
        (None, Some(toml)) => toml.to_string(),
        (None, None) => default.to_string(),
    }
}

fn resolve_usize(env_key: &str, toml_value: Option<usize>, default: usize) -> Result<usize> {
    match std::env::var(env_key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<usize>()
            .map_err(|_| EngineError::Config(format!("{env_key} must be an integer, got {raw:?}"))),
        _ => Ok(toml_value.unwrap_or(default)),
    }
}
