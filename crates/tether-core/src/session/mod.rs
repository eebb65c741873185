//! Sessions: one conversation with the agent
//!
//! A session owns its event listeners and the callbacks the agent may call
//! back into. It is open from creation until the first `close()`; after that
//! every mutating method fails with `SessionClosed` while accessors keep
//! returning their last values.

pub mod events;
pub mod lifecycle;
pub mod listeners;
pub mod registry;

pub use events::{LifecycleEvent, LifecycleMetadata, SessionEvent, event_types, lifecycle_types};
pub use lifecycle::LifecycleEvents;
pub use listeners::{
    DispatchReport, ErrorObserver, EventErrorPolicy, Listener, ListenerSet, RoutedEvent,
    Subscription,
};
pub use registry::SessionRegistry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument};

use crate::callbacks::{
    HookHandler, HookKind, PermissionHandler, SessionHooks, ToolDefinition, ToolHandler,
    UserInputHandler,
};
use crate::error::{TetherError, TetherResult};
use crate::protocol::methods;
use crate::rpc::RpcClient;

/// Upper bound on waiting for `session.destroy` during close
const DESTROY_TIMEOUT: Duration = Duration::from_secs(5);

/// A user message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageOptions {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Value>>,
    /// e.g. `enqueue` or `immediate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl MessageOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Value>) -> Self {
        self.attachments = Some(attachments);
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    events: Vec<SessionEvent>,
}

/// One conversation with the agent
pub struct Session {
    session_id: String,
    workspace_path: Option<PathBuf>,
    rpc: Arc<RpcClient>,
    registry: Weak<SessionRegistry>,
    closed: AtomicBool,
    listeners: Arc<ListenerSet<SessionEvent>>,
    error_policy: RwLock<EventErrorPolicy>,
    error_observer: RwLock<Option<Arc<ErrorObserver<SessionEvent>>>>,
    tools: DashMap<String, ToolDefinition>,
    permission_handler: RwLock<Option<Arc<dyn PermissionHandler>>>,
    user_input_handler: RwLock<Option<Arc<dyn UserInputHandler>>>,
    hooks: DashMap<HookKind, Arc<dyn HookHandler>>,
}

impl Session {
    /// Create a session handle for an id issued by the agent.
    ///
    /// The session removes itself from `registry` when closed; inserting it
    /// is the caller's job.
    pub fn new(
        session_id: impl Into<String>,
        workspace_path: Option<PathBuf>,
        rpc: Arc<RpcClient>,
        registry: &Arc<SessionRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id: session_id.into(),
            workspace_path,
            rpc,
            registry: Arc::downgrade(registry),
            closed: AtomicBool::new(false),
            listeners: ListenerSet::new(),
            error_policy: RwLock::new(EventErrorPolicy::default()),
            error_observer: RwLock::new(None),
            tools: DashMap::new(),
            permission_handler: RwLock::new(None),
            user_input_handler: RwLock::new(None),
            hooks: DashMap::new(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Workspace directory reported by the agent, when infinite sessions are on
    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace_path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> TetherResult<()> {
        if self.is_closed() {
            return Err(TetherError::session_closed(&self.session_id));
        }
        Ok(())
    }

    // Listeners

    /// Receive every event for this session.
    pub fn on<F>(&self, listener: F) -> TetherResult<Subscription>
    where
        F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.ensure_open()?;
        Ok(self.listeners.subscribe(None, Arc::new(listener)))
    }

    /// Receive only events whose type equals `event_type`.
    pub fn on_event<F>(&self, event_type: impl Into<String>, listener: F) -> TetherResult<Subscription>
    where
        F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.ensure_open()?;
        Ok(self
            .listeners
            .subscribe(Some(event_type.into()), Arc::new(listener)))
    }

    pub fn set_event_error_policy(&self, policy: EventErrorPolicy) -> TetherResult<()> {
        self.ensure_open()?;
        *self.error_policy.write() = policy;
        Ok(())
    }

    pub fn event_error_policy(&self) -> EventErrorPolicy {
        *self.error_policy.read()
    }

    /// Observe listener failures. A failing observer stops delivery of the
    /// current event.
    pub fn set_event_error_handler<F>(&self, handler: F) -> TetherResult<()>
    where
        F: Fn(&SessionEvent, &anyhow::Error) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.ensure_open()?;
        *self.error_observer.write() = Some(Arc::new(handler));
        Ok(())
    }

    /// Deliver an event to this session's listeners under its error policy.
    pub fn dispatch_event(&self, event: &SessionEvent) -> DispatchReport {
        if self.is_closed() {
            debug!(
                "dropping '{}' for closed session {}",
                event.event_type, self.session_id
            );
            return DispatchReport::default();
        }
        let policy = self.event_error_policy();
        let observer = self.error_observer.read().clone();
        self.listeners.dispatch(event, policy, observer.as_deref())
    }

    // Callbacks

    /// Add or replace one tool.
    pub fn register_tool(&self, tool: ToolDefinition) -> TetherResult<()> {
        self.ensure_open()?;
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    /// Replace every registered tool.
    pub fn register_tools(&self, tools: Vec<ToolDefinition>) -> TetherResult<()> {
        self.ensure_open()?;
        self.tools.clear();
        for tool in tools {
            self.tools.insert(tool.name.clone(), tool);
        }
        Ok(())
    }

    pub fn set_permission_handler(&self, handler: Arc<dyn PermissionHandler>) -> TetherResult<()> {
        self.ensure_open()?;
        *self.permission_handler.write() = Some(handler);
        Ok(())
    }

    pub fn set_user_input_handler(&self, handler: Arc<dyn UserInputHandler>) -> TetherResult<()> {
        self.ensure_open()?;
        *self.user_input_handler.write() = Some(handler);
        Ok(())
    }

    pub fn set_hook(&self, kind: HookKind, handler: Arc<dyn HookHandler>) -> TetherResult<()> {
        self.ensure_open()?;
        self.hooks.insert(kind, handler);
        Ok(())
    }

    /// Replace every hook handler.
    pub fn set_hooks(&self, hooks: &SessionHooks) -> TetherResult<()> {
        self.ensure_open()?;
        self.hooks.clear();
        for (kind, handler) in hooks.iter() {
            self.hooks.insert(kind, Arc::clone(handler));
        }
        Ok(())
    }

    pub(crate) fn tool_handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).and_then(|tool| tool.handler.clone())
    }

    pub(crate) fn permission_handler(&self) -> Option<Arc<dyn PermissionHandler>> {
        self.permission_handler.read().clone()
    }

    pub(crate) fn user_input_handler(&self) -> Option<Arc<dyn UserInputHandler>> {
        self.user_input_handler.read().clone()
    }

    pub(crate) fn hook_handler(&self, kind: HookKind) -> Option<Arc<dyn HookHandler>> {
        self.hooks.get(&kind).map(|entry| Arc::clone(entry.value()))
    }

    // Outbound calls

    /// Send a user message. Returns the id the agent assigned to it.
    #[instrument(skip(self, options), fields(session_id = %self.session_id), level = "debug")]
    pub async fn send(&self, options: MessageOptions) -> TetherResult<String> {
        self.ensure_open()?;
        let mut params = serde_json::to_value(&options)?;
        params["sessionId"] = json!(self.session_id);
        let response: SendResponse = self.rpc.call(methods::SESSION_SEND, params).await?;
        Ok(response.message_id)
    }

    /// Send a message and wait until the session goes idle.
    ///
    /// Resolves with the last `assistant.message` event seen before
    /// `session.idle`, fails on `session.error`, and fails with `Timeout`
    /// once `timeout` elapses. The agent keeps working after a timeout.
    pub async fn send_and_wait(
        &self,
        options: MessageOptions,
        timeout: Duration,
    ) -> TetherResult<Option<SessionEvent>> {
        self.ensure_open()?;

        let (tx, rx) = oneshot::channel::<TetherResult<()>>();
        let tx = Mutex::new(Some(tx));
        let last_message: Arc<Mutex<Option<SessionEvent>>> = Arc::new(Mutex::new(None));

        let seen = Arc::clone(&last_message);
        let subscription = self.on(move |event| {
            match event.event_type.as_str() {
                event_types::ASSISTANT_MESSAGE => *seen.lock() = Some(event.clone()),
                event_types::SESSION_IDLE => {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                event_types::SESSION_ERROR => {
                    if let Some(tx) = tx.lock().take() {
                        let message = event.data_str("message").unwrap_or("unknown error");
                        let _ = tx.send(Err(TetherError::other(format!(
                            "Session error: {}",
                            message
                        ))));
                    }
                }
                _ => {}
            }
            Ok(())
        })?;

        let outcome = self.wait_for_idle(options, rx, timeout).await;
        subscription.unsubscribe();
        outcome?;

        Ok(last_message.lock().take())
    }

    async fn wait_for_idle(
        &self,
        options: MessageOptions,
        idle: oneshot::Receiver<TetherResult<()>>,
        timeout: Duration,
    ) -> TetherResult<()> {
        self.send(options).await?;
        match tokio::time::timeout(timeout, idle).await {
            Ok(Ok(outcome)) => outcome,
            // Listener dropped: the session was closed while waiting
            Ok(Err(_)) => Err(TetherError::session_closed(&self.session_id)),
            Err(_) => Err(TetherError::timeout(timeout)),
        }
    }

    /// Every event recorded for this session so far
    pub async fn get_messages(&self) -> TetherResult<Vec<SessionEvent>> {
        self.ensure_open()?;
        let response: MessagesResponse = self
            .rpc
            .call(
                methods::SESSION_GET_MESSAGES,
                json!({ "sessionId": self.session_id }),
            )
            .await?;
        Ok(response.events)
    }

    /// Abort whatever the agent is doing in this session.
    pub async fn abort(&self) -> TetherResult<()> {
        self.ensure_open()?;
        let _: Value = self
            .rpc
            .call(methods::SESSION_ABORT, json!({ "sessionId": self.session_id }))
            .await?;
        Ok(())
    }

    /// Close the session.
    ///
    /// The first call marks the session closed, drops its listeners and
    /// callbacks, and asks the agent to release it, waiting a bounded time
    /// for the answer. A failed or unanswered release is only logged; local
    /// teardown always happens. Later calls do nothing.
    pub async fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if_same(self);
        }
        self.listeners.clear();
        self.tools.clear();
        self.hooks.clear();
        *self.permission_handler.write() = None;
        *self.user_input_handler.write() = None;
        *self.error_observer.write() = None;

        let destroy = self.rpc.call::<Value, _>(
            methods::SESSION_DESTROY,
            json!({ "sessionId": self.session_id }),
        );
        match tokio::time::timeout(DESTROY_TIMEOUT, destroy).await {
            Ok(Ok(_)) => info!("session {} closed", self.session_id),
            Ok(Err(e)) => debug!("session {} closed locally; destroy failed: {}", self.session_id, e),
            Err(_) => debug!(
                "session {} closed locally; destroy unanswered after {:?}",
                self.session_id, DESTROY_TIMEOUT
            ),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("workspace_path", &self.workspace_path)
            .field("closed", &self.is_closed())
            .field("listeners", &self.listeners.len())
            .field("tools", &self.tools.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRemote, RecordingHandler};
    use std::sync::atomic::AtomicUsize;

    fn open_session(id: &str) -> (Arc<Session>, Arc<SessionRegistry>, FakeRemote) {
        let (conn, remote) = FakeRemote::pair();
        let rpc = RpcClient::start(conn.reader, conn.writer, RecordingHandler::new());
        let registry = SessionRegistry::new();
        let session = Session::new(id, None, rpc, &registry);
        registry.insert(Arc::clone(&session));
        (session, registry, remote)
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (session, registry, mut remote) = open_session("s1");

        let closer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.close().await })
        };
        let destroy = remote.expect_request("session.destroy").await.unwrap();
        assert_eq!(destroy["params"]["sessionId"], "s1");
        remote.respond(&destroy["id"], json!({})).await.unwrap();
        closer.await.unwrap();

        session.close().await;
        session.close().await;
        assert!(session.is_closed());
        assert!(registry.get("s1").is_none());
        assert_eq!(session.session_id(), "s1");
    }

    #[tokio::test]
    async fn test_mutations_fail_after_close() {
        let (session, _registry, remote) = open_session("s2");
        drop(remote);
        session.close().await;

        assert!(matches!(
            session.on(|_| Ok(())),
            Err(TetherError::SessionClosed { .. })
        ));
        assert!(matches!(
            session.on_event("session.idle", |_| Ok(())),
            Err(TetherError::SessionClosed { .. })
        ));
        assert!(matches!(
            session.set_event_error_policy(EventErrorPolicy::SuppressAndLog),
            Err(TetherError::SessionClosed { .. })
        ));
        assert!(matches!(
            session.register_tool(ToolDefinition::new("t", "d")),
            Err(TetherError::SessionClosed { .. })
        ));
        assert!(matches!(
            session.send(MessageOptions::new("hi")).await,
            Err(TetherError::SessionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_on_dead_connection_is_quiet() {
        let (session, registry, remote) = open_session("s-dead");
        drop(remote);

        tokio::time::timeout(Duration::from_secs(10), session.close())
            .await
            .unwrap();
        assert!(session.is_closed());
        assert!(registry.get("s-dead").is_none());
    }

    #[tokio::test]
    async fn test_stale_close_keeps_resumed_session() {
        let (stale, registry, remote) = open_session("s-resumed");
        drop(remote);
        let resumed = Session::new("s-resumed", None, Arc::clone(&stale.rpc), &registry);
        registry.insert(Arc::clone(&resumed));

        stale.close().await;

        let live = registry.get("s-resumed").unwrap();
        assert!(Arc::ptr_eq(&live, &resumed));
        assert!(!live.is_closed());
    }

    #[tokio::test]
    async fn test_dispatch_respects_policy() {
        let (session, _registry, _remote) = open_session("s3");
        let reached = Arc::new(AtomicUsize::new(0));

        session.on(|_| Err(anyhow::anyhow!("first fails"))).unwrap();
        let counter = Arc::clone(&reached);
        session
            .on(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let event = SessionEvent::new("assistant.message", json!({}));
        let report = session.dispatch_event(&event);
        assert!(report.halted);
        assert_eq!(reached.load(Ordering::SeqCst), 0);

        session
            .set_event_error_policy(EventErrorPolicy::SuppressAndLog)
            .unwrap();
        session.dispatch_event(&event);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_returns_message_id() {
        let (session, _registry, mut remote) = open_session("s4");

        let sender = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send(MessageOptions::new("hello")).await })
        };
        let req = remote.expect_request("session.send").await.unwrap();
        assert_eq!(req["params"]["sessionId"], "s4");
        assert_eq!(req["params"]["prompt"], "hello");
        remote
            .respond(&req["id"], json!({"messageId": "m-1"}))
            .await
            .unwrap();

        assert_eq!(sender.await.unwrap().unwrap(), "m-1");
    }

    #[tokio::test]
    async fn test_send_and_wait_collects_last_assistant_message() {
        let (session, _registry, mut remote) = open_session("s5");

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .send_and_wait(MessageOptions::new("2+2?"), Duration::from_secs(5))
                    .await
            })
        };
        let req = remote.expect_request("session.send").await.unwrap();
        remote
            .respond(&req["id"], json!({"messageId": "m-2"}))
            .await
            .unwrap();

        // Events are routed by the dispatcher in production; deliver directly here
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.dispatch_event(&SessionEvent::new(
            "assistant.message",
            json!({"content": "draft"}),
        ));
        session.dispatch_event(&SessionEvent::new(
            "assistant.message",
            json!({"content": "4"}),
        ));
        session.dispatch_event(&SessionEvent::new("session.idle", json!({})));

        let reply = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(reply.data_str("content"), Some("4"));
    }

    #[tokio::test]
    async fn test_send_and_wait_times_out() {
        let (session, _registry, mut remote) = open_session("s6");

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .send_and_wait(MessageOptions::new("slow"), Duration::from_millis(50))
                    .await
            })
        };
        let req = remote.expect_request("session.send").await.unwrap();
        remote
            .respond(&req["id"], json!({"messageId": "m-3"}))
            .await
            .unwrap();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(TetherError::Timeout { .. })
        ));
    }
}
