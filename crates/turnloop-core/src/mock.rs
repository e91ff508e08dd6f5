//! Scripted Provider
//!
//! For testing and demo purposes. Replays a fixed sequence of completions and
//! records every request it receives.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::{Message, ToolCallRequest};
use crate::provider::{Completion, CompletionRequest, GenerationOptions, LlmProvider, ModelInfo};

/// Snapshot of one `complete` call
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub options: GenerationOptions,
}

/// Provider that answers from a script instead of a model
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Completion>>>,
    /// Returned once the script runs out
    fallback: Option<Completion>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain-text answer
    pub fn then_text(self, content: impl Into<String>) -> Self {
        self.then(Ok(Completion::text("scripted", content)))
    }

    /// Queue a tool-call turn
    pub fn then_calls(self, calls: Vec<ToolCallRequest>) -> Self {
        self.then(Ok(Completion::tool_calls("scripted", calls)))
    }

    /// Queue an endpoint failure
    pub fn then_error(self, error: AgentError) -> Self {
        self.then(Err(error))
    }

    pub fn then(self, step: Result<Completion>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    /// Answer with `completion` forever once the script is exhausted
    pub fn repeat(mut self, completion: Completion) -> Self {
        self.fallback = Some(completion);
        self
    }

    /// Number of `complete` calls so far
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Everything received so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                system: request.system.to_string(),
                messages: request.messages.to_vec(),
                tools: request.tools.iter().map(|t| t.name.clone()).collect(),
                options: request.options.clone(),
            });

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match (next, &self.fallback) {
            (Some(step), _) => step,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(AgentError::Provider("script exhausted".into())),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "scripted".into(),
            owned_by: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModelOutput;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let provider = ScriptedProvider::new()
            .then_text("first")
            .repeat(Completion::text("scripted", "again"));
        let options = GenerationOptions::default();
        let request = CompletionRequest::new("sys", &[], &[], &options);

        let first = provider.complete(request).await.unwrap();
        let second = provider.complete(request).await.unwrap();

        assert_eq!(first.output, ModelOutput::Text("first".into()));
        assert_eq!(second.output, ModelOutput::Text("again".into()));
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.requests()[0].system, "sys");
    }

    #[tokio::test]
    async fn test_exhausted_script_errors() {
        let provider = ScriptedProvider::new();
        let options = GenerationOptions::default();
        let result = provider
            .complete(CompletionRequest::new("", &[], &[], &options))
            .await;
        assert!(matches!(result, Err(AgentError::Provider(_))));
    }
}
