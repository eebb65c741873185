//! Error types for the tether runtime

use serde_json::Value;
use thiserror::Error;

use crate::protocol::RpcError;

/// Result type alias for tether operations
pub type TetherResult<T> = Result<T, TetherError>;

/// Errors surfaced by the transport, the correlator, sessions and the client.
#[derive(Debug, Error, Clone)]
pub enum TetherError {
    /// The stream was closed, either explicitly or because the remote side went away
    #[error("Connection closed")]
    ConnectionClosed,

    /// Could not open or keep the stream
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// No connection has been established yet and auto-start is disabled
    #[error("Client not connected, call start() first")]
    NotConnected,

    /// The agent executable could not be found
    #[error("Agent CLI not found: '{path}'")]
    CliNotFound { path: String },

    /// Spawning the agent process failed for a reason other than a missing binary
    #[error("Failed to spawn agent process: {message}")]
    Spawn { message: String },

    /// The agent process exited before the stream became usable
    #[error("Agent process exited before the connection was ready ({status}){}", stderr_suffix(.stderr))]
    ProcessExited { status: String, stderr: String },

    /// Malformed frame or message
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The remote side answered with a JSON-RPC error
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    /// The remote side speaks a different protocol version
    #[error("Protocol version mismatch: expected {expected}, server reports {}", describe_version(.actual))]
    ProtocolMismatch { expected: u32, actual: Option<u32> },

    /// Invalid client configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A server address could not be parsed
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A mutating call was made on a closed session
    #[error("Session is closed: {session_id}")]
    SessionClosed { session_id: String },

    /// The session id is not known to this client
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// A caller-side wait elapsed
    #[error("Timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Low-level I/O failure on the stream
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Anything else
    #[error("{message}")]
    Other { message: String },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

fn describe_version(actual: &Option<u32>) -> String {
    match actual {
        Some(version) => version.to_string(),
        None => "no version".to_string(),
    }
}

impl TetherError {
    /// Create a new Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new Protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new InvalidAddress error
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a new SessionClosed error
    pub fn session_closed(session_id: impl Into<String>) -> Self {
        Self::SessionClosed {
            session_id: session_id.into(),
        }
    }

    /// Create a new Timeout error
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            millis: duration.as_millis() as u64,
        }
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new Io error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new Other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionClosed => "TETHER_CONNECTION_CLOSED",
            Self::Connection { .. } => "TETHER_CONNECTION",
            Self::NotConnected => "TETHER_NOT_CONNECTED",
            Self::CliNotFound { .. } => "TETHER_CLI_NOT_FOUND",
            Self::Spawn { .. } => "TETHER_SPAWN",
            Self::ProcessExited { .. } => "TETHER_PROCESS_EXITED",
            Self::Protocol { .. } => "TETHER_PROTOCOL",
            Self::Rpc { .. } => "TETHER_RPC",
            Self::ProtocolMismatch { .. } => "TETHER_PROTOCOL_MISMATCH",
            Self::Config { .. } => "TETHER_CONFIG",
            Self::InvalidAddress { .. } => "TETHER_INVALID_ADDRESS",
            Self::SessionClosed { .. } => "TETHER_SESSION_CLOSED",
            Self::SessionNotFound { .. } => "TETHER_SESSION_NOT_FOUND",
            Self::Timeout { .. } => "TETHER_TIMEOUT",
            Self::Serialization { .. } => "TETHER_SERIALIZATION",
            Self::Io { .. } => "TETHER_IO",
            Self::Other { .. } => "TETHER_OTHER",
        }
    }

    /// Whether a caller may reasonably retry the operation.
    ///
    /// Nothing in this crate retries on its own; this is advice for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Io { .. } | Self::Timeout { .. }
        )
    }

    /// Whether this error means the stream is gone
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl From<RpcError> for TetherError {
    fn from(err: RpcError) -> Self {
        Self::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

impl From<serde_json::Error> for TetherError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for TetherError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::io(err.to_string()),
        }
    }
}
