//! Client-side tools the agent can invoke

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Outcome category of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultType {
    Success,
    Failure,
    Rejected,
    Denied,
}

/// Binary payload attached to a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolBinaryResult {
    pub data: String,
    pub mime_type: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fully shaped tool result as sent back to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultObject {
    pub text_result_for_llm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_results_for_llm: Option<Vec<ToolBinaryResult>>,
    pub result_type: ToolResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_telemetry: Option<Map<String, Value>>,
}

impl ToolResultObject {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text_result_for_llm: text.into(),
            binary_results_for_llm: None,
            result_type: ToolResultType::Success,
            error: None,
            session_log: None,
            tool_telemetry: None,
        }
    }

    pub fn failure(text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            result_type: ToolResultType::Failure,
            ..Self::success(text)
        }
    }

    /// Result for a tool name nobody registered
    pub fn unsupported(tool_name: &str) -> Self {
        Self::failure(
            format!("Tool '{}' is not supported.", tool_name),
            format!("tool '{}' not supported", tool_name),
        )
    }
}

/// What a tool handler returns: a shaped result or a raw value
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Result(ToolResultObject),
    Value(Value),
}

impl ToolOutput {
    /// Shape into the wire result.
    ///
    /// Strings are used as the text verbatim; any other raw value is
    /// serialized to JSON text first.
    pub fn into_result_object(self) -> ToolResultObject {
        match self {
            Self::Result(result) => result,
            Self::Value(Value::String(text)) => ToolResultObject::success(text),
            Self::Value(other) => ToolResultObject::success(other.to_string()),
        }
    }
}

impl From<ToolResultObject> for ToolOutput {
    fn from(result: ToolResultObject) -> Self {
        Self::Result(result)
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Value(Value::String(text))
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Value(Value::String(text.to_string()))
    }
}

/// A single tool call from the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub session_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Executes a tool. Errors are reported to the agent as a JSON-RPC error.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, invocation: ToolInvocation) -> anyhow::Result<ToolOutput>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ToolOutput>> + Send,
{
    async fn invoke(&self, invocation: ToolInvocation) -> anyhow::Result<ToolOutput> {
        (self)(invocation).await
    }
}

/// A tool advertised to the agent, optionally with a local handler
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
    pub handler: Option<Arc<dyn ToolHandler>>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
            handler: None,
        }
    }

    /// JSON schema for the tool's arguments
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }

    pub fn with_handler(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Shape sent in `session.create` / `session.resume`
    pub fn to_wire(&self) -> Value {
        let mut wire = json!({
            "name": self.name,
            "description": self.description,
        });
        if let Some(parameters) = &self.parameters {
            wire["parameters"] = parameters.clone();
        }
        wire
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
