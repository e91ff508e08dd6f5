//! Persona Tools
//!
//! Lead capture for the persona: record a visitor who left contact details,
//! and record questions the persona could not answer. Both push a
//! notification and report `{"recorded": "ok"}` back to the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use turnloop_core::{
    Result as CoreResult, Tool, ToolArgs, ToolRegistry, ToolSpec,
    tool::{ParameterSchema, parse_args},
};

use crate::notify::{Notifier, dispatch};

fn recorded() -> Value {
    json!({ "recorded": "ok" })
}

/// Records a visitor who wants to get in touch
pub struct RecordUserDetailsTool {
    notifier: Arc<dyn Notifier>,
}

impl RecordUserDetailsTool {
    pub const NAME: &'static str = "record_user_details";

    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[derive(Debug, Deserialize)]
struct UserDetails {
    email: String,
    name: String,
    notes: String,
}

#[async_trait]
impl Tool for RecordUserDetailsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            Self::NAME,
            "Use this tool to record that a user is interested in being in touch and provided an email address",
        )
        .param(ParameterSchema::required("email", "string", "The email address of this user"))
        .param(
            ParameterSchema::optional("name", "string", "The user's name, if they provided it")
                .with_default(json!("Name not provided")),
        )
        .param(
            ParameterSchema::optional(
                "notes",
                "string",
                "Any additional information about the conversation that's worth recording to give context",
            )
            .with_default(json!("not provided")),
        )
    }

    async fn call(&self, args: ToolArgs) -> CoreResult<Value> {
        let details: UserDetails = parse_args(Self::NAME, args)?;

        dispatch(
            &self.notifier,
            format!(
                "Recording interest from {} with email {} and notes {}",
                details.name, details.email, details.notes
            ),
        );

        Ok(recorded())
    }
}

/// Records a question the persona could not answer
pub struct RecordUnknownQuestionTool {
    notifier: Arc<dyn Notifier>,
}

impl RecordUnknownQuestionTool {
    pub const NAME: &'static str = "record_unknown_question";

    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[derive(Debug, Deserialize)]
struct UnknownQuestion {
    question: String,
}

#[async_trait]
impl Tool for RecordUnknownQuestionTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            Self::NAME,
            "Always use this tool to record any question that couldn't be answered as you didn't know the answer",
        )
        .param(ParameterSchema::required(
            "question",
            "string",
            "The question that couldn't be answered",
        ))
    }

    async fn call(&self, args: ToolArgs) -> CoreResult<Value> {
        let UnknownQuestion { question } = parse_args(Self::NAME, args)?;

        dispatch(
            &self.notifier,
            format!("Recording {} asked that I couldn't answer", question),
        );

        Ok(recorded())
    }
}

/// Register both persona tools, sharing one notifier
pub fn register_tools(registry: &mut ToolRegistry, notifier: Arc<dyn Notifier>) -> CoreResult<()> {
    registry.register(RecordUserDetailsTool::new(Arc::clone(&notifier)))?;
    registry.register(RecordUnknownQuestionTool::new(notifier))?;
    Ok(())
}
