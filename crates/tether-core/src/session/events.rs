//! Event payloads delivered to listeners

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::listeners::RoutedEvent;

/// A notification about one session.
///
/// Only `event_type` is interpreted here; `data` is left for listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<bool>,
}

impl SessionEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            id: None,
            timestamp: None,
            parent_id: None,
            ephemeral: None,
        }
    }

    /// String field of `data`, if present
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

impl RoutedEvent for SessionEvent {
    fn route_key(&self) -> &str {
        &self.event_type
    }
}

/// Well-known session event types
pub mod event_types {
    pub const SESSION_START: &str = "session.start";
    pub const SESSION_RESUME: &str = "session.resume";
    pub const SESSION_IDLE: &str = "session.idle";
    pub const SESSION_ERROR: &str = "session.error";
    pub const USER_MESSAGE: &str = "user.message";
    pub const ASSISTANT_MESSAGE: &str = "assistant.message";
    pub const ASSISTANT_MESSAGE_DELTA: &str = "assistant.message_delta";
    pub const ASSISTANT_TURN_START: &str = "assistant.turn_start";
    pub const ASSISTANT_TURN_END: &str = "assistant.turn_end";
    pub const TOOL_EXECUTION_START: &str = "tool.execution_start";
    pub const TOOL_EXECUTION_COMPLETE: &str = "tool.execution_complete";
    pub const ABORT: &str = "abort";
}

/// Extra details carried by some lifecycle events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A client-wide notification about sessions coming and going
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<LifecycleMetadata>,
}

impl RoutedEvent for LifecycleEvent {
    fn route_key(&self) -> &str {
        &self.event_type
    }
}

/// Well-known lifecycle event types
pub mod lifecycle_types {
    pub const CREATED: &str = "session.created";
    pub const DELETED: &str = "session.deleted";
    pub const UPDATED: &str = "session.updated";
    pub const FOREGROUND: &str = "session.foreground";
    pub const BACKGROUND: &str = "session.background";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_event_from_wire() {
        let event: SessionEvent = serde_json::from_value(json!({
            "id": "e1",
            "timestamp": "2026-01-01T00:00:00Z",
            "parentId": null,
            "type": "assistant.message",
            "data": {"content": "hi", "messageId": "m1"},
        }))
        .unwrap();
        assert!(event.is(event_types::ASSISTANT_MESSAGE));
        assert_eq!(event.data_str("content"), Some("hi"));
        assert_eq!(event.route_key(), "assistant.message");
    }

    #[test]
    fn test_lifecycle_event_tolerates_missing_fields() {
        let event: LifecycleEvent = serde_json::from_value(json!({})).unwrap();
        assert_eq!(event.event_type, "");
        assert_eq!(event.session_id, "");
        assert!(event.metadata.is_none());
    }
}
