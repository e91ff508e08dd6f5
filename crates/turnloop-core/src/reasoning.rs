//! Conversation Loop
//!
//! Drives one conversation turn: query the model, run whatever tools it asks
//! for, feed the results back, and repeat until it answers in plain text.
//!
//! Each round is one model query plus the tool executions it triggers. Calls
//! requested in the same round run concurrently and are joined before the
//! next query. A round is appended to the transcript only once all of its
//! results are in, so a cancelled turn never leaves half a round behind.

use std::sync::Arc;

use futures::future::join_all;

use crate::error::{AgentError, Result};
use crate::message::{Message, ToolCallRequest, Transcript};
use crate::provider::{CompletionRequest, GenerationOptions, LlmProvider, ModelOutput};
use crate::tool::{Tool, ToolRegistry, ToolSpec};

/// Tool-call rounds allowed per turn unless configured otherwise
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Use the available tools when they help you answer. \
After receiving tool results, synthesize them into a helpful response. \
Be concise and accurate.";

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt sent ahead of every transcript
    pub system_prompt: String,

    /// Maximum tool-call rounds per turn before giving up
    pub max_tool_rounds: usize,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            generation: GenerationOptions::default(),
        }
    }
}

impl AgentConfig {
    /// Read `CHAT_MODEL` and `MAX_TOOL_ROUNDS`, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(model) = std::env::var("CHAT_MODEL") {
            config.generation.model = model;
        }
        if let Some(rounds) = std::env::var("MAX_TOOL_ROUNDS")
            .ok()
            .and_then(|r| r.parse().ok())
        {
            config.max_tool_rounds = rounds;
        }

        config
    }
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    specs: Vec<ToolSpec>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let specs = tools.specs();
        Self {
            provider,
            tools,
            specs,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    /// Run one turn with the configured system prompt
    ///
    /// Appends the user message, every intermediate assistant/tool message and
    /// the final answer to `transcript`, and returns the answer. On error the
    /// transcript keeps whatever complete rounds were recorded before it.
    pub async fn run_turn(&self, transcript: &mut Transcript, user_message: &str) -> Result<String> {
        self.run_turn_with_system(&self.config.system_prompt, transcript, user_message)
            .await
    }

    /// Run one turn with an explicit system prompt
    pub async fn run_turn_with_system(
        &self,
        system: &str,
        transcript: &mut Transcript,
        user_message: &str,
    ) -> Result<String> {
        if user_message.trim().is_empty() {
            return Err(AgentError::InvalidInput("user message is empty".into()));
        }

        transcript.push(Message::user(user_message));

        let mut rounds = 0;

        loop {
            let completion = self
                .provider
                .complete(CompletionRequest::new(
                    system,
                    transcript.messages(),
                    &self.specs,
                    &self.config.generation,
                ))
                .await?;

            match completion.output {
                ModelOutput::ToolCalls { content, calls } if !calls.is_empty() => {
                    if rounds == self.config.max_tool_rounds {
                        tracing::warn!(rounds, "Model kept requesting tools, giving up");
                        return Err(AgentError::LoopExceeded { rounds });
                    }
                    rounds += 1;

                    let calls = with_call_ids(calls);
                    tracing::debug!(round = rounds, calls = calls.len(), "Model requested tools");

                    let results = self.resolve_round(&calls).await;
                    transcript.push(Message::assistant_tool_calls(content, calls));
                    transcript.extend(results);
                }
                ModelOutput::ToolCalls { content, .. } => {
                    let answer = content.unwrap_or_default();
                    transcript.push(Message::assistant(answer.clone()));
                    return Ok(answer);
                }
                ModelOutput::Text(answer) => {
                    tracing::debug!(rounds, "Model answered");
                    transcript.push(Message::assistant(answer.clone()));
                    return Ok(answer);
                }
            }
        }
    }

    /// Run with a simple string input (creates temporary transcript)
    pub async fn ask(&self, question: &str) -> Result<String> {
        let mut transcript = Transcript::new();
        self.run_turn(&mut transcript, question).await
    }

    /// Dispatch every call of one round concurrently, results in request order
    async fn resolve_round(&self, calls: &[ToolCallRequest]) -> Vec<Message> {
        join_all(calls.iter().map(|call| self.tools.dispatch(call))).await
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get the model endpoint
    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Give id-less calls a generated id so their results can be matched
fn with_call_ids(calls: Vec<ToolCallRequest>) -> Vec<ToolCallRequest> {
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.is_empty() {
                call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
            call
        })
        .collect()
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
    error: Option<AgentError>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
            error: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        if let Err(e) = self.tools.register(tool) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = Some(temp);
        self
    }

    pub fn max_tool_rounds(mut self, max: usize) -> Self {
        self.config.max_tool_rounds = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}
