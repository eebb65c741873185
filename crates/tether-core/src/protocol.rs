//! JSON-RPC 2.0 message types
//!
//! Inbound messages are classified by shape rather than by serde's untagged
//! fallback so that a request with a `null` id is treated as a notification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TetherError, TetherResult};

/// Protocol version the remote process must report on ping
pub const SDK_PROTOCOL_VERSION: u32 = 2;

/// JSON-RPC version
pub const JSONRPC_VERSION: &str = "2.0";

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Any message that can travel in either direction
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RpcMessage {
    /// Request message
    Request(RpcRequest),
    /// Response message
    Response(RpcResponse),
    /// Notification message (no id)
    Notification(RpcNotification),
}

impl RpcMessage {
    /// Classify a decoded JSON value.
    ///
    /// `method` with a non-null `id` is a request, `method` alone is a
    /// notification, and `id` with `result` or `error` is a response.
    pub fn from_value(value: Value) -> TetherResult<Self> {
        let Some(obj) = value.as_object() else {
            return Err(TetherError::protocol("message is not a JSON object"));
        };
        let has_id = obj.get("id").is_some_and(|id| !id.is_null());
        let has_method = obj.contains_key("method");
        let has_outcome = obj.contains_key("result") || obj.contains_key("error");

        if has_method && has_id {
            Ok(Self::Request(serde_json::from_value(value)?))
        } else if has_method {
            Ok(Self::Notification(serde_json::from_value(value)?))
        } else if has_id && has_outcome {
            Ok(Self::Response(serde_json::from_value(value)?))
        } else {
            Err(TetherError::protocol(
                "message is neither a request, a response nor a notification",
            ))
        }
    }

    /// Check if this is a response
    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    /// Check if this is a request
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    /// Check if this is a notification
    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }

    /// Get the message ID if present
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Response(res) => Some(&res.id),
            Self::Notification(_) => None,
        }
    }
}

/// Request ID (can be string or number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Number ID
    Number(i64),
    /// String ID
    String(String),
    /// Id of a request whose own id could not be read; sent only in error
    /// responses
    Null,
}

impl RequestId {
    /// Numeric view of the id, used to correlate our own outbound requests.
    ///
    /// Outbound ids are always numeric; a string id that parses as a number
    /// is accepted for peers that echo ids back as strings.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => u64::try_from(*n).ok(),
            Self::String(s) => s.parse().ok(),
            Self::Null => None,
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => Self::Number(n),
            Err(_) => Self::String(n.to_string()),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Null => f.write_str("null"),
        }
    }
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Method name
    pub method: String,
    /// Optional parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Create a new request
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Add parameters to the request
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// JSON-RPC version
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Request ID this response corresponds to
    pub id: RequestId,
    /// Result (present on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (present on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Create a success response
    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: impl Into<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Check if this is a success response
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Get the result, consuming the response
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Create a new error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Add data to the error
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Parse error (-32700)
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(Self::PARSE_ERROR, message)
    }

    /// Invalid request (-32600)
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_REQUEST, message)
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            Self::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    /// Invalid params (-32602)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }

    /// Internal error (-32603)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, message)
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// JSON-RPC notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    /// JSON-RPC version
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Optional parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcNotification {
    /// Create a new notification
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params: None,
        }
    }

    /// Add parameters
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Method names used on the wire
pub mod methods {
    /// Liveness check, also carries the protocol version
    pub const PING: &str = "ping";
    /// Server status
    pub const STATUS_GET: &str = "status.get";
    /// Authentication status
    pub const AUTH_GET_STATUS: &str = "auth.getStatus";
    /// Available models
    pub const MODELS_LIST: &str = "models.list";

    /// Create a session
    pub const SESSION_CREATE: &str = "session.create";
    /// Resume a session
    pub const SESSION_RESUME: &str = "session.resume";
    /// Send a user message
    pub const SESSION_SEND: &str = "session.send";
    /// Abort in-flight work
    pub const SESSION_ABORT: &str = "session.abort";
    /// Fetch the message history
    pub const SESSION_GET_MESSAGES: &str = "session.getMessages";
    /// Release a session on the remote side
    pub const SESSION_DESTROY: &str = "session.destroy";
    /// Delete a persisted session
    pub const SESSION_DELETE: &str = "session.delete";
    /// List persisted sessions
    pub const SESSION_LIST: &str = "session.list";
    /// Most recently used session
    pub const SESSION_GET_LAST_ID: &str = "session.getLastId";
    /// Foreground session (TUI+server mode)
    pub const SESSION_GET_FOREGROUND: &str = "session.getForeground";
    /// Switch the foreground session (TUI+server mode)
    pub const SESSION_SET_FOREGROUND: &str = "session.setForeground";

    /// Inbound: per-session event notification
    pub const SESSION_EVENT: &str = "session.event";
    /// Inbound: session lifecycle notification
    pub const SESSION_LIFECYCLE: &str = "session.lifecycle";
    /// Inbound: execute a client-side tool
    pub const TOOL_CALL: &str = "tool.call";
    /// Inbound: ask for a permission decision
    pub const PERMISSION_REQUEST: &str = "permission.request";
    /// Inbound: ask the user a question
    pub const USER_INPUT_REQUEST: &str = "userInput.request";
    /// Inbound: run a lifecycle hook
    pub const HOOKS_INVOKE: &str = "hooks.invoke";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = RpcRequest::new(1i64, methods::PING);
        let json = serde_json::to_string(&req).unwrap();

        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"ping\""));
        assert!(json.contains("\"id\":1"));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_response_error() {
        let res = RpcResponse::error(1i64, RpcError::method_not_found("nope"));

        assert!(!res.is_success());
        let err = res.into_result().unwrap_err();
        assert_eq!(err.code, RpcError::METHOD_NOT_FOUND);
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn test_null_result_is_success() {
        let msg = RpcMessage::from_value(json!({"jsonrpc": "2.0", "id": 4, "result": null}))
            .unwrap();
        let RpcMessage::Response(res) = msg else {
            panic!("expected response");
        };
        assert_eq!(res.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_classify_request_and_notification() {
        let req = RpcMessage::from_value(json!({
            "jsonrpc": "2.0", "id": 7, "method": "tool.call", "params": {}
        }))
        .unwrap();
        assert!(req.is_request());

        let notif = RpcMessage::from_value(json!({
            "jsonrpc": "2.0", "method": "session.event", "params": {}
        }))
        .unwrap();
        assert!(notif.is_notification());

        let null_id = RpcMessage::from_value(json!({
            "jsonrpc": "2.0", "id": null, "method": "session.event"
        }))
        .unwrap();
        assert!(null_id.is_notification());
    }

    #[test]
    fn test_classify_rejects_shapeless_message() {
        assert!(RpcMessage::from_value(json!({"jsonrpc": "2.0", "id": 1})).is_err());
        assert!(RpcMessage::from_value(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_request_id_numeric_view() {
        assert_eq!(RequestId::Number(12).as_u64(), Some(12));
        assert_eq!(RequestId::from("12").as_u64(), Some(12));
        assert_eq!(RequestId::from("abc").as_u64(), None);
        assert_eq!(RequestId::Number(-1).as_u64(), None);
    }

    #[test]
    fn test_string_id_survives_echo() {
        let msg = RpcMessage::from_value(json!({
            "jsonrpc": "2.0", "id": "req-9", "method": "hooks.invoke"
        }))
        .unwrap();
        let response = RpcResponse::success(msg.id().unwrap().clone(), json!({"output": null}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], "req-9");
        assert_eq!(value["result"]["output"], Value::Null);
    }
}
