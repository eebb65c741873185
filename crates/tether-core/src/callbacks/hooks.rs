//! Lifecycle hooks run by the agent at fixed points

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Points at which the agent invokes hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookKind {
    PreToolUse,
    PostToolUse,
    UserPromptSubmitted,
    SessionStart,
    SessionEnd,
    ErrorOccurred,
}

impl HookKind {
    pub const ALL: [HookKind; 6] = [
        HookKind::PreToolUse,
        HookKind::PostToolUse,
        HookKind::UserPromptSubmitted,
        HookKind::SessionStart,
        HookKind::SessionEnd,
        HookKind::ErrorOccurred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreToolUse => "preToolUse",
            Self::PostToolUse => "postToolUse",
            Self::UserPromptSubmitted => "userPromptSubmitted",
            Self::SessionStart => "sessionStart",
            Self::SessionEnd => "sessionEnd",
            Self::ErrorOccurred => "errorOccurred",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown hook kind: {}", s))
    }
}

/// Context for a hook invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInvocation {
    pub session_id: String,
    pub kind: HookKind,
}

/// Runs one kind of hook. `Ok(None)` means "no opinion".
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn run(&self, input: Value, invocation: HookInvocation) -> anyhow::Result<Option<Value>>;
}

#[async_trait]
impl<F, Fut> HookHandler for F
where
    F: Fn(Value, HookInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send,
{
    async fn run(&self, input: Value, invocation: HookInvocation) -> anyhow::Result<Option<Value>> {
        (self)(input, invocation).await
    }
}

/// Hook handlers keyed by kind
#[derive(Clone, Default)]
pub struct SessionHooks {
    handlers: HashMap<HookKind, Arc<dyn HookHandler>>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, kind: HookKind, handler: impl HookHandler + 'static) -> Self {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn get(&self, kind: HookKind) -> Option<Arc<dyn HookHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HookKind, &Arc<dyn HookHandler>)> {
        self.handlers.iter().map(|(kind, handler)| (*kind, handler))
    }
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
