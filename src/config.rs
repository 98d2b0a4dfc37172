//! Configuration types.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, ConfigError};

/// Default system prompt for buyer-facing conversations.
pub const DEFAULT_BUYER_PROMPT: &str = "\
You are a helpful assistant answering buyers on behalf of a marketplace seller.
Listing: {{ channel.metadata.item_name | default('unknown item') }} \
(asking price: {{ channel.metadata.item_price | default('not set') }}).

Reply politely and concisely using the reply_message tool. Call fetch_messages \
if you need older context. When the buyer clearly wants to buy, call trigger_buy. \
When the conversation is finished, call end_session.";

/// Default system prompt for seller-facing conversations.
pub const DEFAULT_SELLER_PROMPT: &str = "\
You are a helpful assistant chatting with a marketplace seller on behalf of a buyer.
Listing: {{ channel.metadata.item_name | default('unknown item') }}.

Use reply_message to answer. Record buying interest with purchase_intent, \
including how confident you are as a percentage. Call end_session once the \
conversation has reached a conclusion.";

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent name for identification.
    pub name: String,
    /// Timeout applied to every external call (model, chat platform).
    pub call_timeout: Duration,
    /// Iteration budget used when a mode does not set one.
    pub default_max_iterations: usize,
    /// Number of recent channel messages placed in the model context.
    pub history_limit: u32,
    /// Output token cap per generation; the provider default when unset.
    pub max_tokens: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "marketplace-agent".to_string(),
            call_timeout: Duration::from_secs(30),
            default_max_iterations: 5,
            history_limit: 20,
            max_tokens: None,
        }
    }
}

impl AgentConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("MARKET_AGENT_NAME") {
            config.name = name;
        }
        if let Some(secs) = parse_env::<u64>("MARKET_AGENT_CALL_TIMEOUT_SECS")? {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_env::<u32>("MARKET_AGENT_HISTORY_LIMIT")? {
            config.history_limit = limit;
        }
        if let Some(iterations) = parse_env::<usize>("MARKET_AGENT_MAX_ITERATIONS")? {
            config.default_max_iterations = iterations;
        }
        if let Some(max_tokens) = parse_env::<u32>("MARKET_AGENT_MAX_TOKENS")? {
            config.max_tokens = Some(max_tokens);
        }
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Configuration for one class of conversations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModeConfig {
    pub name: String,
    /// System prompt template (minijinja syntax).
    pub prompt_template: String,
    /// Optional gate; the loop only runs when this renders truthy.
    #[serde(default)]
    pub when: Option<String>,
    /// Names of the tools offered to the model in this mode.
    pub tools: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    pub model: String,
}

fn default_max_iterations() -> usize {
    5
}

impl ModeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "name".into(),
                message: "mode name must not be empty".into(),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.max_iterations", self.name),
                message: "must be at least 1".into(),
            });
        }
        if self.tools.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.tools", self.name),
                message: "at least one tool is required".into(),
            });
        }
        Ok(())
    }
}

/// All configured conversation modes, keyed by name.
#[derive(Debug, Clone)]
pub struct ModeCatalog {
    modes: HashMap<String, ModeConfig>,
}

impl ModeCatalog {
    /// Build a catalog from a list of modes, validating each one.
    pub fn new(modes: Vec<ModeConfig>) -> Result<Self, ConfigError> {
        let mut map = HashMap::new();
        for mode in modes {
            mode.validate()?;
            if map.contains_key(&mode.name) {
                return Err(ConfigError::InvalidValue {
                    key: mode.name.clone(),
                    message: "duplicate mode name".into(),
                });
            }
            map.insert(mode.name.clone(), mode);
        }
        Ok(Self { modes: map })
    }

    /// Load modes from a JSON file containing an array of `ModeConfig`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let modes: Vec<ModeConfig> = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        Self::new(modes)
    }

    /// Load from `MARKET_AGENT_MODES_PATH`, or the built-in modes when unset.
    pub fn from_env(default_model: &str, agent: &AgentConfig) -> Result<Self, ConfigError> {
        match std::env::var("MARKET_AGENT_MODES_PATH") {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => Ok(Self::builtin(default_model, agent.default_max_iterations.max(1))),
        }
    }

    /// The two stock modes shipped with the binary.
    pub fn builtin(model: &str, max_iterations: usize) -> Self {
        let buyer = ModeConfig {
            name: "buyer_assist".into(),
            prompt_template: DEFAULT_BUYER_PROMPT.into(),
            when: None,
            tools: vec![
                "reply_message".into(),
                "fetch_messages".into(),
                "trigger_buy".into(),
                "end_session".into(),
            ],
            max_iterations,
            model: model.into(),
        };
        let seller = ModeConfig {
            name: "seller_assist".into(),
            prompt_template: DEFAULT_SELLER_PROMPT.into(),
            when: None,
            tools: vec![
                "reply_message".into(),
                "fetch_messages".into(),
                "purchase_intent".into(),
                "end_session".into(),
            ],
            max_iterations,
            model: model.into(),
        };
        let mut modes = HashMap::new();
        modes.insert(buyer.name.clone(), buyer);
        modes.insert(seller.name.clone(), seller);
        Self { modes }
    }

    pub fn get(&self, name: &str) -> Result<&ModeConfig, AgentError> {
        self.modes
            .get(name)
            .ok_or_else(|| AgentError::UnknownMode(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.modes.keys().cloned().collect()
    }
}
