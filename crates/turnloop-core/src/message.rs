//! Conversation Messages
//!
//! Standard message format and the transcript that one conversation owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result fed back to the model
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A model-issued request to run a named tool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call identifier, echoed back on the tool-result message
    pub id: String,

    /// Requested tool name
    pub name: String,

    /// Serialized JSON argument payload, exactly as the model produced it
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content (absent on assistant turns that only request tools)
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls issued by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Originating call ID (tool results only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    /// Create a plain assistant answer
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant turn that requests tool calls
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = calls;
        msg
    }

    /// Create a tool result message
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Text content, empty if absent
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Whether this is an assistant turn carrying tool calls
    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// Transcript invariant violations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("message {index}: tool result without a tool_call_id")]
    MissingCallId { index: usize },

    #[error("message {index}: tool result for '{id}' answers no outstanding request")]
    UnmatchedResult { index: usize, id: String },

    #[error("message {index}: tool calls {ids:?} were never answered")]
    Unanswered { index: usize, ids: Vec<String> },

    #[error("message {index}: two assistant turns in a row")]
    ConsecutiveAssistant { index: usize },

    #[error("message {index}: tool_calls on a non-assistant message")]
    MisplacedToolCalls { index: usize },
}

/// Ordered message history of one conversation
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append several messages in order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Roll back to the first `len` messages
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of tool-result messages
    pub fn tool_results(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::Tool).count()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Check the tool-call pairing and turn-order invariants
    pub fn validate(&self) -> std::result::Result<(), TranscriptError> {
        let mut outstanding: Vec<&str> = Vec::new();
        let mut outstanding_since = 0;
        let mut previous: Option<Role> = None;

        for (index, msg) in self.messages.iter().enumerate() {
            if !msg.tool_calls.is_empty() && msg.role != Role::Assistant {
                return Err(TranscriptError::MisplacedToolCalls { index });
            }

            if msg.role == Role::Tool {
                let id = msg
                    .tool_call_id
                    .as_deref()
                    .ok_or(TranscriptError::MissingCallId { index })?;
                let pos = outstanding.iter().position(|o| *o == id).ok_or_else(|| {
                    TranscriptError::UnmatchedResult {
                        index,
                        id: id.to_string(),
                    }
                })?;
                outstanding.remove(pos);
            } else {
                if !outstanding.is_empty() {
                    return Err(TranscriptError::Unanswered {
                        index: outstanding_since,
                        ids: outstanding.iter().map(|s| (*s).to_string()).collect(),
                    });
                }
                if msg.role == Role::Assistant && previous == Some(Role::Assistant) {
                    return Err(TranscriptError::ConsecutiveAssistant { index });
                }
                if msg.requests_tools() {
                    outstanding = msg.tool_calls.iter().map(|c| c.id.as_str()).collect();
                    outstanding_since = index;
                }
            }

            previous = Some(msg.role);
        }

        if outstanding.is_empty() {
            Ok(())
        } else {
            Err(TranscriptError::Unanswered {
                index: outstanding_since,
                ids: outstanding.iter().map(|s| (*s).to_string()).collect(),
            })
        }
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_messages(messages)
    }
}
