//! Results of client-level queries

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply to `ping`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PingResponse {
    pub message: String,
    pub timestamp: i64,
    pub protocol_version: Option<u32>,
}

/// Reply to `status.get`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusResponse {
    pub version: String,
    pub protocol_version: Option<u32>,
}

/// Reply to `auth.getStatus`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthStatus {
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

/// One entry of `models.list`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    /// Limits and feature flags, passed through untyped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_reasoning_efforts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_reasoning_effort: Option<String>,
}

/// One entry of `session.list`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMetadata {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub is_remote: bool,
}

/// Reply to `session.getForeground`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForegroundSession {
    pub session_id: Option<String>,
    pub workspace_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SessionsResponse {
    pub sessions: Vec<SessionMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct LastSessionResponse {
    pub session_id: Option<String>,
}

/// Shape shared by `session.delete` and `session.setForeground`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SuccessResponse {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionOpened {
    pub session_id: String,
    #[serde(default)]
    pub workspace_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ping_without_protocol_version() {
        let ping: PingResponse = serde_json::from_value(json!({"message": "pong"})).unwrap();
        assert_eq!(ping.protocol_version, None);
    }

    #[test]
    fn test_model_info_keeps_untyped_capabilities() {
        let model: ModelInfo = serde_json::from_value(json!({
            "id": "m-1",
            "name": "Model One",
            "capabilities": {"supports": {"vision": true}},
            "supportedReasoningEfforts": ["low", "high"]
        }))
        .unwrap();
        assert_eq!(model.capabilities.unwrap()["supports"]["vision"], true);
        assert_eq!(model.supported_reasoning_efforts, vec!["low", "high"]);
    }
}
