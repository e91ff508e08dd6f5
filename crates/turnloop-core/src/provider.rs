//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for chat-completion endpoints (OpenAI, Gemini's
//! OpenAI-compatible API, Ollama, etc.) so the conversation loop works with any
//! backend without code changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use turnloop_core::provider::{CompletionRequest, GenerationOptions, LlmProvider};
//!
//! let request = CompletionRequest::new(system, transcript.messages(), &specs, &options);
//! match provider.complete(request).await?.output {
//!     ModelOutput::Text(answer) => println!("{answer}"),
//!     ModelOutput::ToolCalls { calls, .. } => dispatch(calls).await,
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, ToolCallRequest};
use crate::tool::ToolSpec;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o-mini", "gemini-2.0-flash", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Requested response format
    #[serde(default)]
    pub response_format: ResponseFormat,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: None,
            max_tokens: None,
            response_format: ResponseFormat::Text,
        }
    }
}

impl GenerationOptions {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Shape the endpoint should answer in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// A single JSON object
    JsonObject,
}

/// Everything one model query needs
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    /// System prompt, sent ahead of the transcript
    pub system: &'a str,

    /// Conversation so far
    pub messages: &'a [Message],

    /// Tools the model may call (empty disables function calling)
    pub tools: &'a [ToolSpec],

    pub options: &'a GenerationOptions,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(
        system: &'a str,
        messages: &'a [Message],
        tools: &'a [ToolSpec],
        options: &'a GenerationOptions,
    ) -> Self {
        Self {
            system,
            messages,
            tools,
            options,
        }
    }
}

/// What the model decided to do
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelOutput {
    /// Plain answer, the turn is over
    Text(String),

    /// The model wants these tools run before it answers
    ToolCalls {
        /// Optional text emitted alongside the calls
        content: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

impl ModelOutput {
    /// Whether any tool call was requested
    pub fn requests_tools(&self) -> bool {
        matches!(self, ModelOutput::ToolCalls { calls, .. } if !calls.is_empty())
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug)]
pub struct Completion {
    /// Plain answer or tool-call requests
    pub output: ModelOutput,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            output: ModelOutput::Text(content.into()),
            model: model.into(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        }
    }

    pub fn tool_calls(model: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            output: ModelOutput::ToolCalls {
                content: None,
                calls,
            },
            model: model.into(),
            usage: None,
            finish_reason: Some(FinishReason::ToolCalls),
        }
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    #[serde(other)]
    Other,
}

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub owned_by: Option<String>,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface. Implementations must
/// not retry on their own: retry and backoff belong to the caller.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs and health output
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Query the model once
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}
