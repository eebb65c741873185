//! Tether SDK
//!
//! High-level client for driving an agent process over duplex JSON-RPC:
//! starting and stopping the agent, opening sessions, and answering the
//! tool, permission, user-input and hook calls the agent makes back.
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_sdk::{Client, ClientOptions, MessageOptions, SessionConfig, ToolDefinition, ToolInvocation, ToolOutput};
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = Client::new(ClientOptions::default())?;
//! client.start().await?;
//!
//! let weather = ToolDefinition::new("get_weather", "Current weather for a city")
//!     .with_handler(|call: ToolInvocation| async move {
//!         let city = call.arguments["city"].as_str().unwrap_or("nowhere").to_string();
//!         Ok::<_, anyhow::Error>(ToolOutput::from(format!("Sunny in {city}")))
//!     });
//!
//! let session = client
//!     .create_session(SessionConfig::new().with_tool(weather))
//!     .await?;
//! let reply = session
//!     .send_and_wait(MessageOptions::new("Weather in Oslo?"), Duration::from_secs(60))
//!     .await?;
//! println!("{:?}", reply.and_then(|event| event.data_str("content").map(str::to_owned)));
//!
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{
    AuthStatus, Client, ConnectionState, ForegroundSession, ModelInfo, PingResponse,
    SessionConfig, SessionMetadata, StatusResponse,
};

// Re-export commonly used types from core
pub use tether_core::{
    callbacks::{
        HookHandler, HookInvocation, HookKind, PermissionDecision, PermissionDecisionKind,
        PermissionHandler, PermissionInvocation, PermissionPrecedence, PermissionRequest,
        SessionHooks, ToolDefinition, ToolHandler, ToolInvocation, ToolOutput, ToolResultObject,
        ToolResultType, UserInputHandler, UserInputInvocation, UserInputRequest,
        UserInputResponse,
    },
    config::ClientOptions,
    error::{TetherError, TetherResult},
    protocol::SDK_PROTOCOL_VERSION,
    session::{
        DispatchReport, EventErrorPolicy, LifecycleEvent, MessageOptions, Session, SessionEvent,
        Subscription, event_types, lifecycle_types,
    },
};
