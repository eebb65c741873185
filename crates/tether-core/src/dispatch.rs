//! Routing of everything the agent initiates
//!
//! Notifications (`session.event`, `session.lifecycle`) are delivered inline
//! on the read loop so per-session order matches wire order. Reverse calls
//! (`tool.call`, `permission.request`, `userInput.request`, `hooks.invoke`)
//! resolve their session and callback inline, then run the callback on a
//! spawned task that writes the response when it finishes.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::callbacks::{
    HookInvocation, HookKind, PermissionDecision, PermissionInvocation, PermissionRequest,
    ToolInvocation, ToolResultObject, UserInputInvocation, UserInputRequest, run_guarded_async,
};
use crate::protocol::{RpcError, RpcNotification, RpcRequest, methods};
use crate::rpc::{InboundHandler, Responder};
use crate::session::{LifecycleEvent, LifecycleEvents, Session, SessionEvent, SessionRegistry};

/// Methods the agent may invoke on the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundMethod {
    SessionEvent,
    SessionLifecycle,
    ToolCall,
    PermissionRequest,
    UserInputRequest,
    HooksInvoke,
}

impl InboundMethod {
    const TABLE: [(&'static str, InboundMethod); 6] = [
        (methods::SESSION_EVENT, InboundMethod::SessionEvent),
        (methods::SESSION_LIFECYCLE, InboundMethod::SessionLifecycle),
        (methods::TOOL_CALL, InboundMethod::ToolCall),
        (methods::PERMISSION_REQUEST, InboundMethod::PermissionRequest),
        (methods::USER_INPUT_REQUEST, InboundMethod::UserInputRequest),
        (methods::HOOKS_INVOKE, InboundMethod::HooksInvoke),
    ];

    pub fn lookup(method: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(name, _)| *name == method)
            .map(|(_, kind)| *kind)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionEventParams {
    session_id: String,
    event: SessionEvent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionScoped {
    session_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionParams {
    #[serde(default)]
    permission_request: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HookParams {
    hook_type: String,
    #[serde(default)]
    input: Value,
}

/// Routes inbound traffic to sessions and client-level listeners
pub struct Dispatcher {
    sessions: Arc<SessionRegistry>,
    lifecycle: Arc<LifecycleEvents>,
}

impl Dispatcher {
    pub fn new(sessions: Arc<SessionRegistry>, lifecycle: Arc<LifecycleEvents>) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            lifecycle,
        })
    }

    fn route_session_event(&self, params: Value) {
        let params: SessionEventParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                warn!("dropping malformed session.event: {}", e);
                return;
            }
        };
        match self.sessions.get(&params.session_id) {
            Some(session) => {
                session.dispatch_event(&params.event);
            }
            None => debug!(
                "dropping '{}' for unknown session {}",
                params.event.event_type, params.session_id
            ),
        }
    }

    fn route_lifecycle(&self, params: Value) {
        match serde_json::from_value::<LifecycleEvent>(params) {
            Ok(event) => {
                self.lifecycle.dispatch(&event);
            }
            Err(e) => warn!("dropping malformed session.lifecycle: {}", e),
        }
    }

    /// Resolve the session a reverse call refers to, answering with
    /// invalid-params when it cannot be found.
    fn resolve_session(&self, params: &Value, responder: Responder) -> Option<(Arc<Session>, Responder)> {
        let session_id = match SessionScoped::deserialize(params) {
            Ok(scoped) => scoped.session_id,
            Err(e) => {
                let message = format!("Invalid params for {}: {}", responder.method(), e);
                responder.spawn_send(Err(RpcError::invalid_params(message)));
                return None;
            }
        };
        match self.sessions.get(&session_id) {
            Some(session) if !session.is_closed() => Some((session, responder)),
            _ => {
                warn!("{} for unknown session {}", responder.method(), session_id);
                responder.spawn_send(Err(RpcError::invalid_params(format!(
                    "Unknown session {}",
                    session_id
                ))));
                None
            }
        }
    }

    fn handle_tool_call(&self, params: Value, responder: Responder) {
        let Some((session, responder)) = self.resolve_session(&params, responder) else {
            return;
        };
        let invocation: ToolInvocation = match serde_json::from_value(params) {
            Ok(invocation) => invocation,
            Err(e) => {
                responder.spawn_send(Err(RpcError::invalid_params(format!(
                    "Invalid params for tool.call: {}",
                    e
                ))));
                return;
            }
        };

        let Some(handler) = session.tool_handler(&invocation.tool_name) else {
            debug!("tool '{}' is not registered", invocation.tool_name);
            let result = ToolResultObject::unsupported(&invocation.tool_name);
            responder.spawn_send(Ok(json!({ "result": result })));
            return;
        };

        tokio::spawn(async move {
            let tool_name = invocation.tool_name.clone();
            let outcome = match run_guarded_async(handler.invoke(invocation)).await {
                Ok(output) => serde_json::to_value(output.into_result_object())
                    .map(|result| json!({ "result": result }))
                    .map_err(|e| RpcError::internal_error(format!("Tool handler error: {}", e))),
                Err(e) => {
                    warn!("tool '{}' failed: {:#}", tool_name, e);
                    Err(RpcError::internal_error(format!("Tool handler error: {}", e)))
                }
            };
            responder.send(outcome).await;
        });
    }

    fn handle_permission_request(&self, params: Value, responder: Responder) {
        let Some((session, responder)) = self.resolve_session(&params, responder) else {
            return;
        };
        let invocation = PermissionInvocation {
            session_id: session.session_id().to_string(),
        };

        let Some(handler) = session.permission_handler() else {
            debug!("no permission handler for session {}, denying", invocation.session_id);
            responder.spawn_send(Ok(permission_result(PermissionDecision::fail_closed())));
            return;
        };

        let request = serde_json::from_value::<PermissionParams>(params)
            .map_err(anyhow::Error::from)
            .and_then(|p| Ok(serde_json::from_value::<PermissionRequest>(p.permission_request)?));
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                warn!("malformed permission request, denying: {}", e);
                responder.spawn_send(Ok(permission_result(PermissionDecision::fail_closed())));
                return;
            }
        };

        tokio::spawn(async move {
            let decision = match run_guarded_async(handler.decide(request, invocation)).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!("permission handler failed, denying: {:#}", e);
                    PermissionDecision::fail_closed()
                }
            };
            responder.send(Ok(permission_result(decision))).await;
        });
    }

    fn handle_user_input_request(&self, params: Value, responder: Responder) {
        let Some((session, responder)) = self.resolve_session(&params, responder) else {
            return;
        };

        let Some(handler) = session.user_input_handler() else {
            responder.spawn_send(Err(RpcError::internal_error(format!(
                "User input requested but no handler is registered for session {}",
                session.session_id()
            ))));
            return;
        };

        let request: UserInputRequest = match serde_json::from_value(params) {
            Ok(request) => request,
            Err(e) => {
                responder.spawn_send(Err(RpcError::invalid_params(format!(
                    "Invalid params for userInput.request: {}",
                    e
                ))));
                return;
            }
        };
        let invocation = UserInputInvocation {
            session_id: session.session_id().to_string(),
        };

        tokio::spawn(async move {
            let outcome = match run_guarded_async(handler.ask(request, invocation)).await {
                Ok(response) => serde_json::to_value(response)
                    .map_err(|e| RpcError::internal_error(format!("User input handler error: {}", e))),
                Err(e) => {
                    warn!("user input handler failed: {:#}", e);
                    Err(RpcError::internal_error(format!(
                        "User input handler error: {}",
                        e
                    )))
                }
            };
            responder.send(outcome).await;
        });
    }

    fn handle_hooks_invoke(&self, params: Value, responder: Responder) {
        let Some((session, responder)) = self.resolve_session(&params, responder) else {
            return;
        };
        let params: HookParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                responder.spawn_send(Err(RpcError::invalid_params(format!(
                    "Invalid params for hooks.invoke: {}",
                    e
                ))));
                return;
            }
        };

        let handler = params
            .hook_type
            .parse::<HookKind>()
            .ok()
            .and_then(|kind| session.hook_handler(kind).map(|handler| (kind, handler)));
        let Some((kind, handler)) = handler else {
            debug!("no '{}' hook registered, skipping", params.hook_type);
            responder.spawn_send(Ok(json!({ "output": null })));
            return;
        };

        let invocation = HookInvocation {
            session_id: session.session_id().to_string(),
            kind,
        };
        tokio::spawn(async move {
            let outcome = match run_guarded_async(handler.run(params.input, invocation)).await {
                Ok(output) => Ok(json!({ "output": output })),
                Err(e) => {
                    warn!("'{}' hook failed: {:#}", kind, e);
                    Err(RpcError::internal_error(format!("Hook handler error: {}", e)))
                }
            };
            responder.send(outcome).await;
        });
    }
}

fn permission_result(decision: PermissionDecision) -> Value {
    json!({ "result": decision })
}

impl InboundHandler for Dispatcher {
    fn on_notification(&self, notification: RpcNotification) {
        let params = notification.params.unwrap_or(Value::Null);
        match InboundMethod::lookup(&notification.method) {
            Some(InboundMethod::SessionEvent) => self.route_session_event(params),
            Some(InboundMethod::SessionLifecycle) => self.route_lifecycle(params),
            Some(other) => warn!(
                "{:?} arrived as a notification and cannot be answered, dropping",
                other
            ),
            None => debug!("ignoring notification {}", notification.method),
        }
    }

    fn on_request(&self, request: RpcRequest, responder: Responder) {
        let params = request.params.unwrap_or(Value::Null);
        match InboundMethod::lookup(&request.method) {
            Some(InboundMethod::ToolCall) => self.handle_tool_call(params, responder),
            Some(InboundMethod::PermissionRequest) => {
                self.handle_permission_request(params, responder)
            }
            Some(InboundMethod::UserInputRequest) => {
                self.handle_user_input_request(params, responder)
            }
            Some(InboundMethod::HooksInvoke) => self.handle_hooks_invoke(params, responder),
            Some(InboundMethod::SessionEvent) => {
                self.route_session_event(params);
                responder.spawn_send(Ok(Value::Null));
            }
            Some(InboundMethod::SessionLifecycle) => {
                self.route_lifecycle(params);
                responder.spawn_send(Ok(Value::Null));
            }
            None => {
                warn!("no handler for method {}", request.method);
                responder.spawn_send(Err(RpcError::method_not_found(&request.method)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{
        PermissionDecisionKind, ToolDefinition, ToolOutput, UserInputResponse,
    };
    use crate::rpc::RpcClient;
    use crate::session::EventErrorPolicy;
    use crate::testing::FakeRemote;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        remote: FakeRemote,
        session: Arc<Session>,
        lifecycle: Arc<LifecycleEvents>,
        _rpc: Arc<RpcClient>,
    }

    fn harness() -> Harness {
        let (conn, remote) = FakeRemote::pair();
        let sessions = SessionRegistry::new();
        let lifecycle = LifecycleEvents::new();
        let dispatcher = Dispatcher::new(Arc::clone(&sessions), Arc::clone(&lifecycle));
        let rpc = RpcClient::start(conn.reader, conn.writer, dispatcher);
        let session = Session::new("s1", None, Arc::clone(&rpc), &sessions);
        sessions.insert(Arc::clone(&session));
        Harness {
            remote,
            session,
            lifecycle,
            _rpc: rpc,
        }
    }

    #[test]
    fn test_lookup_table() {
        assert_eq!(InboundMethod::lookup("tool.call"), Some(InboundMethod::ToolCall));
        assert_eq!(
            InboundMethod::lookup("userInput.request"),
            Some(InboundMethod::UserInputRequest)
        );
        assert_eq!(InboundMethod::lookup("tools/call"), None);
    }

    #[tokio::test]
    async fn test_unknown_session_is_invalid_params_without_callback() {
        let mut h = harness();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        h.session
            .register_tool(ToolDefinition::new("echo", "Echo").with_handler(
                move |_inv: ToolInvocation| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, anyhow::Error>(ToolOutput::from("x")) }
                },
            ))
            .unwrap();

        for (id, method) in [
            (1, "tool.call"),
            (2, "permission.request"),
            (3, "userInput.request"),
            (4, "hooks.invoke"),
        ] {
            h.remote
                .request(
                    json!(id),
                    method,
                    json!({"sessionId": "nope", "toolName": "echo", "toolCallId": "c",
                           "hookType": "preToolUse", "question": "?"}),
                )
                .await
                .unwrap();
            let reply = h.remote.recv().await.unwrap();
            assert_eq!(reply["id"], id);
            assert_eq!(reply["error"]["code"], RpcError::INVALID_PARAMS);
            assert_eq!(reply["error"]["message"], "Unknown session nope");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool_then_registered() {
        let mut h = harness();
        let call = json!({"sessionId": "s1", "toolCallId": "c1", "toolName": "weather",
                          "arguments": {"city": "Oslo"}});

        h.remote.request(json!(1), "tool.call", call.clone()).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(reply["result"]["result"]["resultType"], "failure");
        assert_eq!(
            reply["result"]["result"]["textResultForLlm"],
            "Tool 'weather' is not supported."
        );

        h.session
            .register_tool(ToolDefinition::new("weather", "Weather").with_handler(
                |inv: ToolInvocation| async move {
                    Ok::<_, anyhow::Error>(ToolOutput::from(json!({
                        "city": inv.arguments["city"],
                        "temp": 3
                    })))
                },
            ))
            .unwrap();

        h.remote.request(json!(2), "tool.call", call).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(reply["id"], 2);
        assert_eq!(reply["result"]["result"]["resultType"], "success");
        assert_eq!(
            reply["result"]["result"]["textResultForLlm"],
            r#"{"city":"Oslo","temp":3}"#
        );
    }

    #[tokio::test]
    async fn test_tool_failure_and_panic_become_internal_errors() {
        let mut h = harness();
        h.session
            .register_tool(ToolDefinition::new("fails", "").with_handler(
                |_inv: ToolInvocation| async { Err::<ToolOutput, _>(anyhow::anyhow!("disk full")) },
            ))
            .unwrap();
        h.session
            .register_tool(ToolDefinition::new("panics", "").with_handler(
                |_inv: ToolInvocation| async {
                    if true {
                        panic!("tool exploded");
                    }
                    Ok::<ToolOutput, anyhow::Error>(ToolOutput::from("unreachable"))
                },
            ))
            .unwrap();

        for (id, name) in [(1, "fails"), (2, "panics")] {
            h.remote
                .request(
                    json!(id),
                    "tool.call",
                    json!({"sessionId": "s1", "toolCallId": "c", "toolName": name}),
                )
                .await
                .unwrap();
            let reply = h.remote.recv().await.unwrap();
            assert_eq!(reply["error"]["code"], RpcError::INTERNAL_ERROR);
            let message = reply["error"]["message"].as_str().unwrap();
            assert!(message.starts_with("Tool handler error"), "{message}");
        }
    }

    #[tokio::test]
    async fn test_slow_tool_does_not_block_read_loop() {
        let mut h = harness();
        h.session
            .register_tool(ToolDefinition::new("slow", "").with_handler(
                |_inv: ToolInvocation| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, anyhow::Error>(ToolOutput::from("done"))
                },
            ))
            .unwrap();
        h.session
            .register_tool(ToolDefinition::new("fast", "").with_handler(
                |_inv: ToolInvocation| async { Ok::<_, anyhow::Error>(ToolOutput::from("quick")) },
            ))
            .unwrap();

        h.remote
            .request(json!(1), "tool.call", json!({"sessionId": "s1", "toolCallId": "a", "toolName": "slow"}))
            .await
            .unwrap();
        h.remote
            .request(json!(2), "tool.call", json!({"sessionId": "s1", "toolCallId": "b", "toolName": "fast"}))
            .await
            .unwrap();

        let first = h.remote.recv().await.unwrap();
        let second = h.remote.recv().await.unwrap();
        assert_eq!(first["id"], 2);
        assert_eq!(second["id"], 1);
    }

    #[tokio::test]
    async fn test_permission_defaults_and_failures_deny() {
        let mut h = harness();
        let request = json!({"sessionId": "s1", "permissionRequest": {"kind": "shell"}});

        h.remote.request(json!(1), "permission.request", request.clone()).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(
            reply["result"]["result"]["kind"],
            "denied-no-approval-rule-and-could-not-request-from-user"
        );

        h.session
            .set_permission_handler(Arc::new(
                |_req: PermissionRequest, _inv: PermissionInvocation| async {
                    Err::<PermissionDecision, _>(anyhow::anyhow!("policy store offline"))
                },
            ))
            .unwrap();
        h.remote.request(json!(2), "permission.request", request.clone()).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(
            reply["result"]["result"]["kind"],
            "denied-no-approval-rule-and-could-not-request-from-user"
        );

        h.session
            .set_permission_handler(Arc::new(
                |req: PermissionRequest, _inv: PermissionInvocation| async move {
                    Ok::<_, anyhow::Error>(if req.kind == "shell" {
                        PermissionDecision::approved()
                    } else {
                        PermissionDecision::denied_by_user()
                    })
                },
            ))
            .unwrap();
        h.remote.request(json!(3), "permission.request", request).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        let decision: PermissionDecision =
            serde_json::from_value(reply["result"]["result"].clone()).unwrap();
        assert_eq!(decision.kind, PermissionDecisionKind::Approved);
    }

    #[tokio::test]
    async fn test_user_input_without_handler_is_error() {
        let mut h = harness();
        let params = json!({"sessionId": "s1", "question": "Which branch?", "choices": ["main", "dev"]});

        h.remote.request(json!(1), "userInput.request", params.clone()).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(reply["error"]["code"], RpcError::INTERNAL_ERROR);

        h.session
            .set_user_input_handler(Arc::new(
                |req: UserInputRequest, _inv: UserInputInvocation| async move {
                    let first = req.choices.and_then(|c| c.into_iter().next()).unwrap_or_default();
                    Ok::<_, anyhow::Error>(UserInputResponse::choice(first))
                },
            ))
            .unwrap();
        h.remote.request(json!(2), "userInput.request", params).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(reply["result"], json!({"answer": "main", "wasFreeform": false}));
    }

    #[tokio::test]
    async fn test_hooks_default_to_null_output() {
        let mut h = harness();
        let params = json!({"sessionId": "s1", "hookType": "preToolUse", "input": {"toolName": "bash"}});

        h.remote.request(json!(1), "hooks.invoke", params.clone()).await.unwrap();
        assert_eq!(h.remote.recv().await.unwrap()["result"], json!({"output": null}));

        h.session
            .set_hook(
                HookKind::PreToolUse,
                Arc::new(|input: Value, _inv: HookInvocation| async move {
                    Ok::<_, anyhow::Error>(Some(json!({
                        "permissionDecision": "deny",
                        "reason": format!("{} blocked", input["toolName"].as_str().unwrap_or("?")),
                    })))
                }),
            )
            .unwrap();
        h.remote.request(json!(2), "hooks.invoke", params).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(reply["result"]["output"]["reason"], "bash blocked");

        h.remote
            .request(json!(3), "hooks.invoke", json!({"sessionId": "s1", "hookType": "somethingNew"}))
            .await
            .unwrap();
        assert_eq!(h.remote.recv().await.unwrap()["result"], json!({"output": null}));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let mut h = harness();
        h.remote.request(json!(7), "files.read", json!({})).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(reply["error"]["code"], RpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_events_routed_in_order() {
        let mut h = harness();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        h.session
            .on(move |event| {
                sink.lock().push(event.event_type.clone());
                Ok(())
            })
            .unwrap();
        h.session
            .set_event_error_policy(EventErrorPolicy::SuppressAndLog)
            .unwrap();

        for event_type in ["a", "b", "c"] {
            h.remote.emit_event("s1", event_type, json!({})).await.unwrap();
        }
        h.remote.emit_event("other", "ignored", json!({})).await.unwrap();
        // Round-trip through an unknown method to know the loop caught up
        h.remote.request(json!(99), "sync", json!({})).await.unwrap();
        h.remote.recv().await.unwrap();

        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_lifecycle_notifications_reach_listeners() {
        let mut h = harness();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        h.lifecycle.subscribe(move |event| {
            sink.lock().push((event.event_type.clone(), event.session_id.clone()));
            Ok(())
        });

        h.remote
            .notify("session.lifecycle", json!({"type": "session.created", "sessionId": "s9"}))
            .await
            .unwrap();
        h.remote.request(json!(1), "sync", json!({})).await.unwrap();
        h.remote.recv().await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![("session.created".to_string(), "s9".to_string())]
        );
    }

    #[tokio::test]
    async fn test_malformed_reverse_call_params_are_invalid_params() {
        let mut h = harness();
        h.session
            .set_user_input_handler(Arc::new(
                |_req: UserInputRequest, _inv: UserInputInvocation| async move {
                    Ok::<_, anyhow::Error>(UserInputResponse::choice("unused"))
                },
            ))
            .unwrap();

        let cases = [
            (1, "tool.call", json!({"sessionId": "s1", "toolCallId": "c1"})),
            (2, "tool.call", json!("not an object")),
            (3, "tool.call", json!({"sessionId": 42, "toolName": "t", "toolCallId": "c"})),
            (4, "hooks.invoke", json!({"sessionId": "s1", "input": {}})),
            (5, "userInput.request", json!({"sessionId": "s1", "choices": ["a"]})),
        ];
        for (id, method, params) in cases {
            h.remote.request(json!(id), method, params).await.unwrap();
            let reply = h.remote.recv().await.unwrap();
            assert_eq!(reply["id"], id);
            assert_eq!(reply["error"]["code"], RpcError::INVALID_PARAMS, "{method}: {reply}");
            let message = reply["error"]["message"].as_str().unwrap();
            assert!(message.starts_with(&format!("Invalid params for {method}")), "{message}");
        }
    }

    #[tokio::test]
    async fn test_in_flight_tool_call_is_answered_after_close() {
        let mut h = harness();
        let gate = Arc::new(tokio::sync::Notify::new());
        let released = Arc::clone(&gate);
        h.session
            .register_tool(ToolDefinition::new("gated", "").with_handler(
                move |_inv: ToolInvocation| {
                    let gate = Arc::clone(&released);
                    async move {
                        gate.notified().await;
                        Ok::<_, anyhow::Error>(ToolOutput::from("released"))
                    }
                },
            ))
            .unwrap();
        let call = json!({"sessionId": "s1", "toolCallId": "c1", "toolName": "gated"});

        h.remote.request(json!(1), "tool.call", call.clone()).await.unwrap();
        // The read loop is sequential, so this reply means call 1 is in flight
        h.remote.request(json!(99), "test.sync", json!({})).await.unwrap();
        assert_eq!(h.remote.recv().await.unwrap()["id"], 99);

        let closer = {
            let session = Arc::clone(&h.session);
            tokio::spawn(async move { session.close().await })
        };
        let destroy = h.remote.expect_request("session.destroy").await.unwrap();
        h.remote.respond(&destroy["id"], json!({})).await.unwrap();
        closer.await.unwrap();

        h.remote.request(json!(2), "tool.call", call).await.unwrap();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(reply["id"], 2);
        assert_eq!(reply["error"]["code"], RpcError::INVALID_PARAMS);

        gate.notify_one();
        let reply = h.remote.recv().await.unwrap();
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["result"]["textResultForLlm"], "released");
    }

    #[tokio::test]
    async fn test_calls_racing_close_each_get_one_reply() {
        let mut h = harness();
        h.session
            .register_tool(ToolDefinition::new("echo", "").with_handler(
                |_inv: ToolInvocation| async { Ok::<_, anyhow::Error>(ToolOutput::from("ok")) },
            ))
            .unwrap();

        let closer = {
            let session = Arc::clone(&h.session);
            tokio::spawn(async move { session.close().await })
        };
        for id in 0..10 {
            h.remote
                .request(
                    json!(id),
                    "tool.call",
                    json!({"sessionId": "s1", "toolCallId": format!("c{id}"), "toolName": "echo"}),
                )
                .await
                .unwrap();
        }

        let mut answered = Vec::new();
        while answered.len() < 10 {
            let msg = h.remote.recv().await.unwrap();
            if msg["method"] == "session.destroy" {
                h.remote.respond(&msg["id"], json!({})).await.unwrap();
                continue;
            }
            let well_formed = msg["result"]["result"]["resultType"].is_string()
                || msg["error"]["code"] == RpcError::INVALID_PARAMS;
            assert!(well_formed, "{msg}");
            answered.push(msg["id"].as_u64().unwrap());
        }
        closer.await.unwrap();

        answered.sort_unstable();
        assert_eq!(answered, (0..10).collect::<Vec<u64>>());
    }
}
