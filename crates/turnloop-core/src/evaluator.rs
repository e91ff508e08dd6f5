//! Reply Evaluation
//!
//! Optional second opinion on a finished turn. An [`Evaluator`] judges the
//! candidate reply; a rejected reply is discarded and the turn is re-run once
//! with the rejection appended to the system prompt. The retried reply is
//! returned whatever the second verdict says.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::{Message, Role, Transcript};
use crate::provider::{CompletionRequest, GenerationOptions, LlmProvider, ModelOutput, ResponseFormat};
use crate::reasoning::Agent;

/// Verdict on a candidate reply
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub is_acceptable: bool,
    #[serde(default)]
    pub feedback: String,
}

impl Evaluation {
    pub fn accept() -> Self {
        Self {
            is_acceptable: true,
            feedback: String::new(),
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            is_acceptable: false,
            feedback: feedback.into(),
        }
    }
}

/// Judges whether a reply is good enough to show the user
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// `history` is the transcript as it stood before the user message
    async fn evaluate(&self, history: &[Message], user_message: &str, reply: &str) -> Result<Evaluation>;
}

/// Evaluator backed by a second model call
pub struct LlmEvaluator {
    provider: Arc<dyn LlmProvider>,
    system_prompt: String,
    options: GenerationOptions,
}

impl LlmEvaluator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let options = GenerationOptions {
            response_format: ResponseFormat::JsonObject,
            ..GenerationOptions::for_model(model)
        };
        Self {
            provider,
            system_prompt: system_prompt.into(),
            options,
        }
    }

    fn user_prompt(history: &[Message], user_message: &str, reply: &str) -> String {
        let mut prompt = String::from("Here's the conversation between the User and the Agent:\n\n");
        prompt.push_str(&render_history(history));
        prompt.push_str("\n\nHere's the latest message from the User:\n\n");
        prompt.push_str(user_message);
        prompt.push_str("\n\nHere's the latest response from the Agent:\n\n");
        prompt.push_str(reply);
        prompt.push_str(
            "\n\nPlease evaluate the response. Answer with a JSON object of the form \
             {\"is_acceptable\": true|false, \"feedback\": \"...\"}.",
        );
        prompt
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(&self, history: &[Message], user_message: &str, reply: &str) -> Result<Evaluation> {
        let messages = [Message::user(Self::user_prompt(history, user_message, reply))];
        let completion = self
            .provider
            .complete(CompletionRequest::new(
                &self.system_prompt,
                &messages,
                &[],
                &self.options,
            ))
            .await?;

        match completion.output {
            ModelOutput::Text(text) => parse_verdict(&text),
            ModelOutput::ToolCalls { .. } => Err(AgentError::Parse(
                "evaluator answered with tool calls".into(),
            )),
        }
    }
}

fn render_history(history: &[Message]) -> String {
    if history.is_empty() {
        return "(no earlier messages)".into();
    }

    history
        .iter()
        .map(|m| match m.role {
            Role::Assistant if m.requests_tools() => {
                let names: Vec<&str> = m.tool_calls.iter().map(|c| c.name.as_str()).collect();
                format!("assistant: [called {}]", names.join(", "))
            }
            role => format!("{}: {}", role, m.text()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract an [`Evaluation`] from a model answer, tolerating code fences and prose
pub fn parse_verdict(text: &str) -> Result<Evaluation> {
    let start = text.find('{');
    let end = text.rfind('}');

    let json = match (start, end) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => return Err(AgentError::Parse(format!("no JSON verdict in: {}", text.trim()))),
    };

    serde_json::from_str(json).map_err(|e| AgentError::Parse(format!("bad evaluator verdict: {}", e)))
}

/// System prompt for the single retry after a rejection
pub fn retry_prompt(base: &str, rejected_reply: &str, feedback: &str) -> String {
    format!(
        "{base}\n\n## Previous answer rejected\n\
         You just tried to reply, but quality control rejected your reply.\n\
         ## Your attempted answer:\n{rejected_reply}\n\
         ## Reason for rejection:\n{feedback}\n"
    )
}

/// Where a reviewed turn stands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    /// First attempt
    Drafting,
    /// Second and final attempt
    Retried,
}

impl ReviewState {
    /// Next state after a verdict, or `None` when the current reply is final
    pub fn after(self, accepted: bool) -> Option<ReviewState> {
        match (self, accepted) {
            (ReviewState::Drafting, false) => Some(ReviewState::Retried),
            _ => None,
        }
    }
}

/// Outcome of a reviewed turn
#[derive(Clone, Debug)]
pub struct ReviewedReply {
    pub content: String,
    /// State the returned reply was produced in
    pub state: ReviewState,
    /// Verdict on the returned reply
    pub evaluation: Evaluation,
}

impl ReviewedReply {
    pub fn retried(&self) -> bool {
        self.state == ReviewState::Retried
    }
}

/// Agent whose replies pass through an evaluator, with at most one retry
pub struct ReviewedAgent {
    agent: Arc<Agent>,
    evaluator: Arc<dyn Evaluator>,
}

impl ReviewedAgent {
    pub fn new(agent: Arc<Agent>, evaluator: Arc<dyn Evaluator>) -> Self {
        Self { agent, evaluator }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Run a turn, evaluate it, and retry once on rejection
    ///
    /// A rejected attempt is rolled back out of `transcript` before the retry,
    /// so only the returned reply's messages remain.
    pub async fn run_turn(&self, transcript: &mut Transcript, user_message: &str) -> Result<ReviewedReply> {
        let checkpoint = transcript.len();
        let base = self.agent.config().system_prompt.as_str();
        let mut system = base.to_string();
        let mut state = ReviewState::Drafting;

        loop {
            let reply = self
                .agent
                .run_turn_with_system(&system, transcript, user_message)
                .await?;

            let evaluation = self
                .evaluator
                .evaluate(&transcript.messages()[..checkpoint], user_message, &reply)
                .await?;

            match state.after(evaluation.is_acceptable) {
                None => {
                    if !evaluation.is_acceptable {
                        tracing::warn!(feedback = %evaluation.feedback, "Retried reply also rejected, returning it as-is");
                    }
                    return Ok(ReviewedReply {
                        content: reply,
                        state,
                        evaluation,
                    });
                }
                Some(next) => {
                    tracing::info!(feedback = %evaluation.feedback, "Reply rejected, retrying once");
                    transcript.truncate(checkpoint);
                    system = retry_prompt(base, &reply, &evaluation.feedback);
                    state = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedProvider;
    use crate::reasoning::AgentBuilder;
    use std::sync::Mutex;

    /// Returns queued verdicts and records what it was shown
    struct QueuedEvaluator {
        verdicts: Mutex<Vec<Evaluation>>,
        seen: Mutex<Vec<(usize, String)>>,
    }

    impl QueuedEvaluator {
        fn new(mut verdicts: Vec<Evaluation>) -> Self {
            verdicts.reverse();
            Self {
                verdicts: Mutex::new(verdicts),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Evaluator for QueuedEvaluator {
        async fn evaluate(&self, history: &[Message], _user: &str, reply: &str) -> Result<Evaluation> {
            self.seen.lock().unwrap().push((history.len(), reply.to_string()));
            Ok(self.verdicts.lock().unwrap().pop().unwrap_or_else(Evaluation::accept))
        }
    }

    fn reviewed(provider: Arc<ScriptedProvider>, evaluator: Arc<QueuedEvaluator>) -> ReviewedAgent {
        let agent = AgentBuilder::new()
            .provider(provider)
            .system_prompt("You are Ed.")
            .build()
            .unwrap();
        ReviewedAgent::new(Arc::new(agent), evaluator)
    }

    #[tokio::test]
    async fn test_accepted_reply_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new().then_text("Hi, I'm Ed."));
        let evaluator = Arc::new(QueuedEvaluator::new(vec![Evaluation::accept()]));
        let agent = reviewed(provider.clone(), evaluator.clone());

        let mut transcript = Transcript::new();
        let reply = agent.run_turn(&mut transcript, "hello").await.unwrap();

        assert_eq!(reply.content, "Hi, I'm Ed.");
        assert!(!reply.retried());
        assert_eq!(provider.calls(), 1);
        assert_eq!(evaluator.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_reply_retried_exactly_once() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_text("Ixnay on the atentpay")
                .then_text("Still wrong"),
        );
        let evaluator = Arc::new(QueuedEvaluator::new(vec![
            Evaluation::reject("Answer in English"),
            Evaluation::reject("Still bad"),
        ]));
        let agent = reviewed(provider.clone(), evaluator.clone());

        let mut transcript = Transcript::from_messages(vec![
            Message::user("earlier"),
            Message::assistant("earlier reply"),
        ]);
        let reply = agent.run_turn(&mut transcript, "do you hold a patent?").await.unwrap();

        assert_eq!(reply.content, "Still wrong");
        assert!(reply.retried());
        assert!(!reply.evaluation.is_acceptable);
        assert_eq!(provider.calls(), 2);

        // Both evaluations saw only the pre-turn history
        let seen = evaluator.seen.lock().unwrap();
        assert_eq!(*seen, vec![(2, "Ixnay on the atentpay".to_string()), (2, "Still wrong".to_string())]);

        // Retry carried the rejection in the system prompt
        let retry = &provider.requests()[1];
        assert!(retry.system.starts_with("You are Ed."));
        assert!(retry.system.contains("Ixnay on the atentpay"));
        assert!(retry.system.contains("Answer in English"));
        assert_eq!(retry.messages.len(), 3);

        // The rejected attempt was rolled back
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.last().unwrap().text(), "Still wrong");
        assert_eq!(transcript.validate(), Ok(()));
    }

    #[tokio::test]
    async fn test_llm_evaluator_parses_fenced_json() {
        let judge = Arc::new(ScriptedProvider::new().then_text(
            "```json\n{\"is_acceptable\": false, \"feedback\": \"too curt\"}\n```",
        ));
        let evaluator = LlmEvaluator::new(judge.clone(), "You are an evaluator.", "gemini-2.0-flash");

        let history = [Message::user("hi"), Message::assistant("hello")];
        let verdict = evaluator.evaluate(&history, "tell me more", "no").await.unwrap();

        assert_eq!(verdict, Evaluation::reject("too curt"));

        let request = &judge.requests()[0];
        assert_eq!(request.options.response_format, ResponseFormat::JsonObject);
        assert_eq!(request.options.model, "gemini-2.0-flash");
        assert!(request.tools.is_empty());
        let prompt = request.messages[0].text();
        assert!(prompt.contains("user: hi"));
        assert!(prompt.contains("tell me more"));
    }

    #[test]
    fn test_parse_verdict_errors() {
        assert!(matches!(parse_verdict("looks fine to me"), Err(AgentError::Parse(_))));
        assert!(matches!(parse_verdict("{\"feedback\": \"x\"}"), Err(AgentError::Parse(_))));
        assert_eq!(
            parse_verdict("{\"is_acceptable\": true}").unwrap(),
            Evaluation::accept()
        );
    }

    #[test]
    fn test_review_state_retries_at_most_once() {
        assert_eq!(ReviewState::Drafting.after(false), Some(ReviewState::Retried));
        assert_eq!(ReviewState::Drafting.after(true), None);
        assert_eq!(ReviewState::Retried.after(false), None);
        assert_eq!(ReviewState::Retried.after(true), None);
    }
}
