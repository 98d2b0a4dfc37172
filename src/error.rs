//! Error types for the marketplace agent.

use std::time::Duration;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Chat platform errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {channel}: {reason}")]
    SendFailed { channel: String, reason: String },

    #[error("Failed to fetch history for channel {channel}: {reason}")]
    FetchFailed { channel: String, reason: String },

    #[error("Failed to load info for channel {channel}: {reason}")]
    InfoFailed { channel: String, reason: String },

    #[error("Invalid response from chat platform: {0}")]
    InvalidResponse(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tool registration and execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid tool: {reason}")]
    InvalidTool { reason: String },

    #[error("Tool {name} is already registered")]
    Duplicate { name: String },

    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Invalid parameters for tool {name}: {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("Tool {name} failed to send message: {source}")]
    Send {
        name: String,
        #[source]
        source: ChannelError,
    },

    #[error("Tool {name} failed to fetch history: {source}")]
    UpstreamFetch {
        name: String,
        #[source]
        source: ChannelError,
    },

    #[error("Tool {name} persistence failed: {source}")]
    Persistence {
        name: String,
        #[source]
        source: DatabaseError,
    },
}

/// Errors that abort processing of one inbound message.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Malformed session id {value:?}: {reason}")]
    InvalidSessionId { value: String, reason: String },

    #[error("Template {name} failed: {reason}")]
    Template { name: String, reason: String },

    #[error("Unknown conversation mode: {0}")]
    UnknownMode(String),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
