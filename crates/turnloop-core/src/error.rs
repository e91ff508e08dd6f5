//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Tool-level variants (`UnknownTool`, `ArgumentParse`, `ToolExecution`) never
/// escape a conversation turn: the loop turns them into tool-error results so
/// the model can recover. Everything else is fatal for the current turn.
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments did not match the declared parameters
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    ArgumentParse { tool: String, reason: String },

    /// Tool execution failed
    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    /// Tool-call rounds exceeded the configured maximum
    #[error("Tool-call loop exceeded {rounds} rounds")]
    LoopExceeded { rounds: usize },

    /// Caller supplied input the loop cannot run with
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parse error (e.g., evaluator verdict)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::Io(_)
        )
    }

    /// Whether the error is reported back to the model instead of ending the turn
    pub fn is_tool_error(&self) -> bool {
        matches!(
            self,
            AgentError::UnknownTool(_)
                | AgentError::ArgumentParse { .. }
                | AgentError::ToolExecution { .. }
        )
    }

    /// Shorthand for a tool execution failure
    pub fn tool_failed(tool: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        AgentError::ToolExecution {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    /// Convert to a user-friendly message
    ///
    /// Tool errors are never shown to end users; they only reach the model.
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(_) => "The AI service encountered an error. Please try again.".into(),
            AgentError::ProviderUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            AgentError::LoopExceeded { .. } => "The request took too long to process. Please try a simpler query.".into(),
            AgentError::InvalidInput(msg) => format!("Invalid request: {}", msg),
            AgentError::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            AgentError::Auth(_) => "The AI service rejected our credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
