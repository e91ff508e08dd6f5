//! # turnloop-runtime
//!
//! Model endpoint providers for the turnloop system.
//!
//! ## Providers
//!
//! - **OpenAI-compatible** (default): OpenAI, Gemini's compatibility API, and
//!   Ollama's `/v1` endpoint all speak the same chat-completions protocol
//!
//! ## Usage
//!
//! ```rust,ignore
//! use turnloop_runtime::{OpenAiConfig, OpenAiProvider};
//!
//! let provider = OpenAiProvider::new(OpenAiConfig::from_env())?;
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(provider))
//!     .build()?;
//! ```

pub mod openai;

pub use openai::{OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use turnloop_core::{
    Agent, AgentError, LlmProvider, Message, Result, Role, Tool, ToolRegistry, Transcript,
};
