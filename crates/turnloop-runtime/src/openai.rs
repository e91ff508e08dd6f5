//! OpenAI-Compatible Provider
//!
//! Implementation of `LlmProvider` for any endpoint that speaks the OpenAI
//! chat-completions protocol: OpenAI itself, Gemini's compatibility API, and
//! Ollama's `/v1` surface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use turnloop_core::{
    error::{AgentError, Result},
    message::{Message, Role, ToolCallRequest},
    provider::{
        Completion, CompletionRequest, FinishReason, LlmProvider, ModelInfo, ModelOutput,
        ResponseFormat, TokenUsage,
    },
    tool::ToolSpec,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Endpoint configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Display name used in logs
    pub name: String,

    /// API root, without the trailing `/chat/completions`
    pub base_url: String,

    /// Bearer token (optional for local endpoints)
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            name: "OpenAI".into(),
            base_url: OPENAI_BASE_URL.into(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    /// Read `OPENAI_BASE_URL` and `OPENAI_API_KEY`
    pub fn from_env() -> Self {
        Self::from_env_prefixed("OPENAI", &Self::default())
    }

    /// Read `{prefix}_BASE_URL` and `{prefix}_API_KEY`, falling back to `base`
    pub fn from_env_prefixed(prefix: &str, base: &OpenAiConfig) -> Self {
        let base_url = std::env::var(format!("{prefix}_BASE_URL"))
            .unwrap_or_else(|_| base.base_url.clone());
        let api_key = std::env::var(format!("{prefix}_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| base.api_key.clone());

        Self {
            base_url,
            api_key,
            ..base.clone()
        }
    }

    /// Gemini through its OpenAI-compatible endpoint
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self {
            name: "Gemini".into(),
            base_url: GEMINI_BASE_URL.into(),
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Local Ollama through its OpenAI-compatible endpoint
    pub fn ollama() -> Self {
        Self {
            name: "Ollama".into(),
            base_url: OLLAMA_BASE_URL.into(),
            ..Default::default()
        }
    }
}

/// Chat-completions provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env())
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("invalid response body: {}", e)))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(provider = %self.config.name, "Health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion> {
        let body = ChatRequest::from_request(&request);
        tracing::debug!(
            provider = %self.config.name,
            model = %request.options.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Querying model"
        );

        let response: ChatResponse = self
            .send(self.client.post(self.url("chat/completions")).json(&body))
            .await?;

        response.into_completion(&request.options.model)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let list: ModelList = self.send(self.client.get(self.url("models"))).await?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                owned_by: m.owned_by,
            })
            .collect())
    }
}

fn status_error(status: StatusCode, body: &str) -> AgentError {
    let detail = format!("{}: {}", status, body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(detail),
        s if s.is_server_error() => AgentError::ProviderUnavailable(detail),
        _ => AgentError::Provider(detail),
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
}

impl<'a> ChatRequest<'a> {
    fn from_request(request: &CompletionRequest<'a>) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(WireMessage::from(&Message::system(request.system)));
        }
        messages.extend(request.messages.iter().map(WireMessage::from));

        let response_format = match request.options.response_format {
            ResponseFormat::Text => None,
            ResponseFormat::JsonObject => Some(WireResponseFormat {
                kind: "json_object",
            }),
        };

        Self {
            model: &request.options.model,
            messages,
            tools: request.tools.iter().map(WireTool::from).collect(),
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
            response_format,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: message.tool_calls.iter().map(WireToolCall::from).collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl From<&ToolCallRequest> for WireToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

impl From<WireToolCall> for ToolCallRequest {
    fn from(call: WireToolCall) -> Self {
        ToolCallRequest::new(call.id, call.function.name, call.function.arguments)
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.json_schema(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl ChatResponse {
    fn into_completion(self, requested_model: &str) -> Result<Completion> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("No choices in response".into()))?;

        let calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(ToolCallRequest::from)
            .collect();

        let output = if calls.is_empty() {
            ModelOutput::Text(choice.message.content.unwrap_or_default())
        } else {
            ModelOutput::ToolCalls {
                content: choice.message.content.filter(|c| !c.is_empty()),
                calls,
            }
        };

        Ok(Completion {
            output,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            usage: self.usage,
            finish_reason: choice.finish_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use turnloop_core::provider::GenerationOptions;
    use turnloop_core::tool::ParameterSchema;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig {
            base_url: server.uri(),
            api_key: Some("test_api_key".into()),
            ..Default::default()
        })
        .unwrap()
    }

    async fn mount_completion(server: &MockServer, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_config_defaults() {
        let config = OpenAiConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert!(config.api_key.is_none());
        assert_eq!(OpenAiConfig::ollama().base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_wire_messages_carry_tool_linkage() {
        let messages = vec![
            Message::user("Hi"),
            Message::assistant_tool_calls(
                None,
                vec![ToolCallRequest::new("call_1", "record_user_details", r#"{"email":"a@b.com"}"#)],
            ),
            Message::tool("call_1", r#"{"recorded":"ok"}"#),
        ];
        let options = GenerationOptions::default();
        let request = CompletionRequest::new("sys", &messages, &[], &options);

        let wire = serde_json::to_value(ChatRequest::from_request(&request)).unwrap();
        let sent = wire["messages"].as_array().unwrap();

        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], json!({"role": "system", "content": "sys"}));
        assert_eq!(sent[2]["content"], Value::Null);
        assert_eq!(sent[2]["tool_calls"][0]["type"], "function");
        assert_eq!(sent[2]["tool_calls"][0]["function"]["name"], "record_user_details");
        assert_eq!(sent[3]["tool_call_id"], "call_1");
        assert!(wire.get("tools").is_none());
        assert!(wire.get("response_format").is_none());
    }

    #[tokio::test]
    async fn test_complete_plain_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test_api_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-123",
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello! How can I help?", "tool_calls": null},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 6, "total_tokens": 18}
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let specs = vec![
            ToolSpec::new("record_unknown_question", "Record a question")
                .param(ParameterSchema::required("question", "string", "The question")),
        ];
        let messages = vec![Message::user("Hello")];
        let options = GenerationOptions::default();

        let completion = provider
            .complete(CompletionRequest::new("Be nice.", &messages, &specs, &options))
            .await
            .unwrap();

        assert_eq!(completion.output, ModelOutput::Text("Hello! How can I help?".into()));
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.unwrap().total_tokens, 18);

        let received = server.received_requests().await.unwrap();
        let body: Value = received[0].body_json().unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["tools"][0]["function"]["name"], "record_unknown_question");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["question"]));
    }

    #[tokio::test]
    async fn test_complete_tool_calls() {
        let server = MockServer::start().await;
        mount_completion(&server, 200, json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "record_user_details", "arguments": "{\"email\":\"a@b.com\"}"}},
                        {"id": "call_b", "type": "function",
                         "function": {"name": "record_unknown_question", "arguments": "{\"question\":\"patents?\"}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .await;

        let provider = provider_for(&server);
        let messages = vec![Message::user("I'm a@b.com. Any patents?")];
        let options = GenerationOptions::default();

        let completion = provider
            .complete(CompletionRequest::new("", &messages, &[], &options))
            .await
            .unwrap();

        assert_eq!(completion.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(completion.model, "gpt-4o-mini");
        match completion.output {
            ModelOutput::ToolCalls { content, calls } => {
                assert!(content.is_none());
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0], ToolCallRequest::new("call_a", "record_user_details", "{\"email\":\"a@b.com\"}"));
                assert_eq!(calls[1].name, "record_unknown_question");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }

        // Empty system prompt is not sent
        let body: Value = server.received_requests().await.unwrap()[0].body_json().unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_response_format_requested() {
        let server = MockServer::start().await;
        mount_completion(&server, 200, json!({
            "choices": [{"message": {"content": "{\"is_acceptable\": true}"}, "finish_reason": "stop"}]
        }))
        .await;

        let provider = provider_for(&server);
        let messages = vec![Message::user("judge this")];
        let options = GenerationOptions {
            response_format: ResponseFormat::JsonObject,
            temperature: Some(0.0),
            ..GenerationOptions::for_model("gemini-2.0-flash")
        };

        provider
            .complete(CompletionRequest::new("judge", &messages, &[], &options))
            .await
            .unwrap();

        let body: Value = server.received_requests().await.unwrap()[0].body_json().unwrap();
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["model"], "gemini-2.0-flash");
        assert_eq!(body["temperature"], json!(0.0));
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let cases = [
            (401, "auth"),
            (429, "rate"),
            (503, "unavailable"),
            (400, "provider"),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            mount_completion(&server, status, json!({"error": {"message": "nope"}})).await;

            let provider = provider_for(&server);
            let messages = vec![Message::user("hi")];
            let options = GenerationOptions::default();
            let err = provider
                .complete(CompletionRequest::new("", &messages, &[], &options))
                .await
                .unwrap_err();

            let matched = match expected {
                "auth" => matches!(err, AgentError::Auth(_)),
                "rate" => matches!(err, AgentError::RateLimited(_)),
                "unavailable" => matches!(err, AgentError::ProviderUnavailable(_)),
                _ => matches!(err, AgentError::Provider(_)),
            };
            assert!(matched, "status {status} mapped to {err:?}");
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_provider_error() {
        let server = MockServer::start().await;
        mount_completion(&server, 200, json!({"choices": []})).await;

        let provider = provider_for(&server);
        let options = GenerationOptions::default();
        let err = provider
            .complete(CompletionRequest::new("", &[], &[], &options))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Provider(_)));
    }

    #[tokio::test]
    async fn test_list_models_and_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [
                    {"id": "gpt-4o-mini", "object": "model", "owned_by": "openai"},
                    {"id": "llama3.2", "object": "model"}
                ]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let models = provider.list_models().await.unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].owned_by.as_deref(), Some("openai"));
        assert!(provider.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_reports_unreachable() {
        let provider = OpenAiProvider::new(OpenAiConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();

        assert!(!provider.health_check().await.unwrap());
    }
}
