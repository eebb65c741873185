//! Tether Core Library
//!
//! This crate provides the runtime underneath the tether client: JSON-RPC
//! protocol types, Content-Length framing, connection establishment,
//! request correlation, dispatch of agent-initiated calls to user
//! callbacks, and per-session event delivery.

pub mod callbacks;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod rpc;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use callbacks::{
    HookHandler, HookInvocation, HookKind, PermissionDecision, PermissionDecisionKind,
    PermissionHandler, PermissionInvocation, PermissionPrecedence, PermissionRequest,
    SessionHooks, ToolDefinition, ToolHandler, ToolInvocation, ToolOutput, ToolResultObject,
    ToolResultType, UserInputHandler, UserInputInvocation, UserInputRequest, UserInputResponse,
};
pub use config::ClientOptions;
pub use connection::{ConnectTarget, Connection, ServerAddress, SpawnMode, SpawnSpec};
pub use dispatch::Dispatcher;
pub use error::{TetherError, TetherResult};
pub use protocol::{RequestId, RpcError, SDK_PROTOCOL_VERSION};
pub use rpc::{InboundHandler, Responder, RpcClient};
pub use session::{
    DispatchReport, EventErrorPolicy, LifecycleEvent, LifecycleEvents, MessageOptions, Session,
    SessionEvent, SessionRegistry, Subscription,
};
