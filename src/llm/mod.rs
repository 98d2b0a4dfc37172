//! LLM integration.
//!
//! `LlmProvider` is the seam the agent loop depends on; `AnthropicProvider`
//! talks to the Messages API directly over reqwest.

pub mod anthropic;
pub mod provider;
pub mod reasoning;

pub use anthropic::AnthropicProvider;
pub use provider::*;
pub use reasoning::{Generation, Reasoning, TokenUsage};

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, LlmError};

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn from_env(timeout: Duration) -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".into()))?;
        let model = std::env::var("MARKET_AGENT_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
        Ok(Self {
            api_key: secrecy::SecretString::from(api_key),
            model,
            base_url: std::env::var("ANTHROPIC_BASE_URL").ok(),
            timeout,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let mut provider =
        AnthropicProvider::new(config.api_key.clone(), &config.model, config.timeout)?;
    if let Some(ref base_url) = config.base_url {
        provider = provider.with_base_url(base_url);
    }
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(provider))
}
