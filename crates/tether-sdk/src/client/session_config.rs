//! Options for `session.create` and `session.resume`

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use tether_core::callbacks::{
    HookKind, PermissionHandler, PermissionPrecedence, SessionHooks, ToolDefinition,
    UserInputHandler,
};
use tether_core::error::TetherResult;
use tether_core::session::{EventErrorPolicy, Session};

/// Everything a new or resumed session is configured with
///
/// Model and agent options travel to the agent as-is; tools, handlers and
/// hooks stay local and are installed on the session before the call
/// returns.
#[derive(Clone, Default)]
pub struct SessionConfig {
    /// Requested id for a new session; the agent picks one when unset
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub reasoning_effort: Option<String>,
    pub system_message: Option<Value>,
    pub available_tools: Option<Vec<String>>,
    pub excluded_tools: Option<Vec<String>>,
    /// Custom model provider, passed through untyped
    pub provider: Option<Value>,
    pub working_directory: Option<String>,
    pub config_dir: Option<String>,
    pub streaming: bool,
    pub mcp_servers: Option<Value>,
    pub custom_agents: Option<Value>,
    pub infinite_sessions: Option<Value>,
    /// Resume only: reattach without replaying the session to the agent
    pub disable_resume: bool,
    pub tools: Vec<ToolDefinition>,
    pub permission_handler: Option<Arc<dyn PermissionHandler>>,
    pub user_input_handler: Option<Arc<dyn UserInputHandler>>,
    pub hooks: SessionHooks,
    pub permission_precedence: PermissionPrecedence,
    pub event_error_policy: EventErrorPolicy,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_permission_handler(mut self, handler: impl PermissionHandler + 'static) -> Self {
        self.permission_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_user_input_handler(mut self, handler: impl UserInputHandler + 'static) -> Self {
        self.user_input_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_permission_precedence(mut self, precedence: PermissionPrecedence) -> Self {
        self.permission_precedence = precedence;
        self
    }

    pub fn with_event_error_policy(mut self, policy: EventErrorPolicy) -> Self {
        self.event_error_policy = policy;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Params for `session.create`, or `session.resume` when `resume_id`
    /// is given.
    pub fn to_params(&self, resume_id: Option<&str>) -> Value {
        let mut params = Map::new();
        let mut put = |key: &str, value: Value| {
            params.insert(key.to_string(), value);
        };

        match resume_id {
            Some(id) => put("sessionId", json!(id)),
            None => {
                if let Some(id) = &self.session_id {
                    put("sessionId", json!(id));
                }
            }
        }
        if let Some(model) = &self.model {
            put("model", json!(model));
        }
        if let Some(effort) = &self.reasoning_effort {
            put("reasoningEffort", json!(effort));
        }
        if !self.tools.is_empty() {
            let tools: Vec<Value> = self.tools.iter().map(ToolDefinition::to_wire).collect();
            put("tools", Value::Array(tools));
        }
        let passthrough = [
            ("systemMessage", &self.system_message),
            ("provider", &self.provider),
            ("mcpServers", &self.mcp_servers),
            ("customAgents", &self.custom_agents),
            ("infiniteSessions", &self.infinite_sessions),
        ];
        for (key, value) in passthrough {
            if let Some(value) = value {
                put(key, value.clone());
            }
        }
        if let Some(tools) = &self.available_tools {
            put("availableTools", json!(tools));
        }
        if let Some(tools) = &self.excluded_tools {
            put("excludedTools", json!(tools));
        }
        if let Some(dir) = &self.working_directory {
            put("workingDirectory", json!(dir));
        }
        if let Some(dir) = &self.config_dir {
            put("configDir", json!(dir));
        }
        if self.permission_handler.is_some() {
            put("requestPermission", json!(true));
        }
        if self.user_input_handler.is_some() {
            put("requestUserInput", json!(true));
        }
        if !self.hooks.is_empty() {
            put("hooks", json!(true));
        }
        if self.streaming {
            put("streaming", json!(true));
        }
        if resume_id.is_some() && self.disable_resume {
            put("disableResume", json!(true));
        }
        put("permissionPrecedence", json!(self.permission_precedence));
        put("envValueMode", json!("direct"));

        Value::Object(params)
    }

    /// Install tools, handlers and hooks on a freshly opened session.
    pub(crate) fn install(&self, session: &Session) -> TetherResult<()> {
        session.register_tools(self.tools.clone())?;
        if let Some(handler) = &self.permission_handler {
            session.set_permission_handler(Arc::clone(handler))?;
        }
        if let Some(handler) = &self.user_input_handler {
            session.set_user_input_handler(Arc::clone(handler))?;
        }
        session.set_hooks(&self.hooks)?;
        session.set_event_error_policy(self.event_error_policy)
    }

    /// Hook kinds with a handler, for logging
    pub(crate) fn hook_kinds(&self) -> Vec<HookKind> {
        self.hooks.iter().map(|(kind, _)| kind).collect()
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("session_id", &self.session_id)
            .field("model", &self.model)
            .field("tools", &self.tools)
            .field("has_permission_handler", &self.permission_handler.is_some())
            .field("has_user_input_handler", &self.user_input_handler.is_some())
            .field("hooks", &self.hook_kinds())
            .field("permission_precedence", &self.permission_precedence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::callbacks::{
        HookInvocation, PermissionDecision, PermissionInvocation, PermissionRequest,
    };

    #[test]
    fn test_minimal_params() {
        let params = SessionConfig::new().to_params(None);
        assert_eq!(
            params,
            json!({"permissionPrecedence": "handlerFirst", "envValueMode": "direct"})
        );
    }

    #[test]
    fn test_flags_follow_installed_callbacks() {
        let config = SessionConfig::new()
            .with_model("fast-model")
            .with_tool(ToolDefinition::new("lookup", "Look things up"))
            .with_permission_handler(|_req: PermissionRequest, _inv: PermissionInvocation| async {
                Ok::<_, anyhow::Error>(PermissionDecision::approved())
            })
            .with_hooks(SessionHooks::new().on(
                HookKind::SessionStart,
                |_input: Value, _inv: HookInvocation| async {
                    Ok::<Option<Value>, anyhow::Error>(None)
                },
            ))
            .with_permission_precedence(PermissionPrecedence::HookFirst);

        let params = config.to_params(None);
        assert_eq!(params["model"], "fast-model");
        assert_eq!(params["tools"][0]["name"], "lookup");
        assert_eq!(params["requestPermission"], true);
        assert_eq!(params["hooks"], true);
        assert_eq!(params["permissionPrecedence"], "hookFirst");
        assert!(params.get("requestUserInput").is_none());
    }

    #[test]
    fn test_resume_id_wins() {
        let mut config = SessionConfig::new().with_session_id("ignored");
        config.disable_resume = true;

        let params = config.to_params(Some("s-42"));
        assert_eq!(params["sessionId"], "s-42");
        assert_eq!(params["disableResume"], true);

        assert!(config.to_params(None).get("disableResume").is_none());
    }
}
