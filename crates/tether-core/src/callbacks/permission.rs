//! Permission decisions for actions the agent wants to take

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the agent is asking permission for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// e.g. `shell`, `write`, `url`, `mcp`
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Kind-specific fields
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Context for a permission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionInvocation {
    pub session_id: String,
}

/// Result category of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionDecisionKind {
    Approved,
    DeniedByRules,
    DeniedNoApprovalRuleAndCouldNotRequestFromUser,
    DeniedInteractivelyByUser,
}

/// Reply to a permission request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub kind: PermissionDecisionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Value>>,
}

impl PermissionDecision {
    pub fn new(kind: PermissionDecisionKind) -> Self {
        Self { kind, rules: None }
    }

    pub fn approved() -> Self {
        Self::new(PermissionDecisionKind::Approved)
    }

    pub fn denied_by_user() -> Self {
        Self::new(PermissionDecisionKind::DeniedInteractivelyByUser)
    }

    pub fn denied_by_rules(rules: Vec<Value>) -> Self {
        Self {
            kind: PermissionDecisionKind::DeniedByRules,
            rules: Some(rules),
        }
    }

    /// Used whenever no decision could be obtained
    pub fn fail_closed() -> Self {
        Self::new(PermissionDecisionKind::DeniedNoApprovalRuleAndCouldNotRequestFromUser)
    }

    pub fn is_approved(&self) -> bool {
        self.kind == PermissionDecisionKind::Approved
    }
}

/// Decides whether the agent may proceed
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    async fn decide(
        &self,
        request: PermissionRequest,
        invocation: PermissionInvocation,
    ) -> anyhow::Result<PermissionDecision>;
}

#[async_trait]
impl<F, Fut> PermissionHandler for F
where
    F: Fn(PermissionRequest, PermissionInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<PermissionDecision>> + Send,
{
    async fn decide(
        &self,
        request: PermissionRequest,
        invocation: PermissionInvocation,
    ) -> anyhow::Result<PermissionDecision> {
        (self)(request, invocation).await
    }
}

/// Which answer wins when both a permission handler and a `preToolUse` hook
/// express a decision for the same tool call. Sent to the agent at session
/// creation; the agent applies it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionPrecedence {
    #[default]
    HandlerFirst,
    HookFirst,
}
