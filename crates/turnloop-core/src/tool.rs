//! Tool System
//!
//! Explicit name-keyed registry of typed tools. Every entry declares its
//! [`ToolSpec`] up front; the registry validates the model's argument payload
//! against it before the tool ever runs.

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::{Message, ToolCallRequest};

/// Parsed tool arguments, keyed by parameter name
pub type ToolArgs = Map<String, Value>;

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    fn new(name: &str, param_type: &str, description: &str, required: bool) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required,
            default: None,
            enum_values: None,
        }
    }

    /// A parameter the model must always supply
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self::new(name, param_type, description, true)
    }

    /// A parameter the model may omit
    pub fn optional(name: &str, param_type: &str, description: &str) -> Self {
        Self::new(name, param_type, description, false)
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    fn accepts(&self, value: &Value) -> bool {
        match self.param_type.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            _ => true,
        }
    }
}

/// Tool definition (name, description, parameters)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter
    pub fn param(mut self, param: ParameterSchema) -> Self {
        self.parameters.push(param);
        self
    }

    /// JSON Schema `object` describing the parameters, as function-calling APIs expect
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut prop = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(values) = &param.enum_values {
                prop["enum"] = Value::Array(values.clone());
            }
            properties.insert(param.name.clone(), prop);
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Parse a raw argument payload and check it against the declared parameters
    ///
    /// Missing optional parameters receive their declared default. An empty
    /// payload is treated as `{}`.
    pub fn prepare_arguments(&self, raw: &str) -> Result<ToolArgs> {
        let raw = raw.trim();
        let parsed: Value = if raw.is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(raw).map_err(|e| self.invalid(format!("malformed JSON: {}", e)))?
        };

        let Value::Object(mut args) = parsed else {
            return Err(self.invalid("arguments must be a JSON object"));
        };

        if let Some(unknown) = args
            .keys()
            .find(|k| !self.parameters.iter().any(|p| &p.name == *k))
        {
            return Err(self.invalid(format!("unexpected parameter '{}'", unknown)));
        }

        for param in &self.parameters {
            match args.get(&param.name) {
                None | Some(Value::Null) => {
                    if let Some(default) = &param.default {
                        args.insert(param.name.clone(), default.clone());
                    } else if param.required {
                        return Err(self.invalid(format!("missing required parameter '{}'", param.name)));
                    } else {
                        args.remove(&param.name);
                    }
                }
                Some(value) => {
                    if !param.accepts(value) {
                        return Err(self.invalid(format!(
                            "parameter '{}' must be of type {}",
                            param.name, param.param_type
                        )));
                    }
                    if let Some(allowed) = &param.enum_values {
                        if !allowed.contains(value) {
                            return Err(self.invalid(format!(
                                "parameter '{}' must be one of {}",
                                param.name,
                                Value::Array(allowed.clone())
                            )));
                        }
                    }
                }
            }
        }

        Ok(args)
    }

    fn invalid(&self, reason: impl Into<String>) -> AgentError {
        AgentError::ArgumentParse {
            tool: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Deserialize prepared arguments into a tool's typed parameter struct
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: ToolArgs) -> Result<T> {
    serde_json::from_value(Value::Object(args)).map_err(|e| AgentError::ArgumentParse {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's declared contract
    fn spec(&self) -> ToolSpec;

    /// Run the tool with validated arguments, returning a JSON value
    async fn call(&self, args: ToolArgs) -> Result<Value>;
}

/// Adapts a typed async closure to [`Tool`]
pub struct FnTool<A, R, F> {
    spec: ToolSpec,
    func: F,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R, F> FnTool<A, R, F> {
    pub fn new(spec: ToolSpec, func: F) -> Self {
        Self {
            spec,
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<A, R, F, Fut> Tool for FnTool<A, R, F>
where
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        let typed: A = parse_args(&self.spec.name, args)?;
        let output = (self.func)(typed)
            .await
            .map_err(|e| AgentError::tool_failed(&self.spec.name, e))?;
        Ok(serde_json::to_value(output)?)
    }
}

struct RegisteredTool {
    spec: ToolSpec,
    tool: Arc<dyn Tool>,
}

/// Registry for available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    ///
    /// The spec is captured once here; later `spec()` results are ignored.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let spec = tool.spec();
        if self.tools.contains_key(&spec.name) {
            return Err(AgentError::Config(format!(
                "tool '{}' is already registered",
                spec.name
            )));
        }
        self.tools.insert(spec.name.clone(), RegisteredTool { spec, tool });
        Ok(())
    }

    /// Register a typed async function under `spec`
    pub fn register_fn<A, R, F, Fut>(&mut self, spec: ToolSpec, func: F) -> Result<()>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.register(FnTool::new(spec, func))
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.tool.clone())
    }

    /// Get a tool's registered spec
    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|t| &t.spec)
    }

    /// All registered specs, ordered by name
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec.clone()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve and run one requested call
    pub async fn execute(&self, request: &ToolCallRequest) -> Result<Value> {
        let entry = self
            .tools
            .get(&request.name)
            .ok_or_else(|| AgentError::UnknownTool(request.name.clone()))?;

        let args = entry.spec.prepare_arguments(&request.arguments)?;

        // A panicking tool must not take the turn down with it
        match AssertUnwindSafe(entry.tool.call(args)).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_tool_error() => Err(e),
            Ok(Err(e)) => Err(AgentError::tool_failed(&request.name, e)),
            Err(panic) => Err(AgentError::tool_failed(
                &request.name,
                format!("tool panicked: {}", panic_reason(panic.as_ref())),
            )),
        }
    }

    /// Run a call and package the outcome as a tool-result message
    ///
    /// Never fails: tool errors become `{"error": ...}` results keyed to the
    /// originating call.
    pub async fn dispatch(&self, request: &ToolCallRequest) -> Message {
        tracing::debug!(tool = %request.name, call_id = %request.id, "Executing tool");

        let content = match self.execute(request).await {
            Ok(value) => value.to_string(),
            Err(e) => {
                tracing::warn!(tool = %request.name, call_id = %request.id, error = %e, "Tool call failed");
                json!({ "error": e.to_string() }).to_string()
            }
        };

        Message::tool(request.id.clone(), content)
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}
