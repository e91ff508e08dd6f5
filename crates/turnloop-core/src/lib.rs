//! # turnloop-core
//!
//! Tool-calling conversation loop with a provider-agnostic LLM abstraction and
//! an explicit, typed tool registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Agent                                │
//! │  ┌──────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ Conversation │  │    Tools    │  │   LlmProvider       │  │
//! │  │    Loop      │──│   Registry  │──│   (Strategy)        │  │
//! │  └──────────────┘  └─────────────┘  └─────────────────────┘  │
//! │          │                                                   │
//! │  ┌───────┴──────┐                                            │
//! │  │  Evaluator   │  optional: judge reply, retry once         │
//! │  └──────────────┘                                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One round is one model query plus the tool calls it requests, dispatched
//! concurrently and joined before the next query. The loop ends when the model
//! answers in plain text, or fails once the round cap is exceeded.

pub mod provider;
pub mod tool;
pub mod reasoning;
pub mod evaluator;
pub mod message;
pub mod error;
pub mod mock;

pub use error::{AgentError, Result};
pub use evaluator::{Evaluation, Evaluator, LlmEvaluator, ReviewedAgent, ReviewedReply};
pub use message::{Message, Role, ToolCallRequest, Transcript};
pub use provider::{Completion, CompletionRequest, GenerationOptions, LlmProvider, ModelOutput};
pub use reasoning::{Agent, AgentBuilder, AgentConfig};
pub use tool::{ParameterSchema, Tool, ToolArgs, ToolRegistry, ToolSpec};
