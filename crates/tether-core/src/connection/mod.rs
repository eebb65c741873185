//! Connection establishment
//!
//! Produces a duplex byte stream plus the handle used to tear it down: either
//! a spawned agent process (stdio or socket mode) or a TCP connection to an
//! agent that is already running.

pub mod address;
pub mod process;

use tokio::net::TcpStream;
use tracing::{debug, info};

pub use address::ServerAddress;
pub use process::{AgentProcess, SpawnMode, SpawnSpec};

use crate::error::{TetherError, TetherResult};
use crate::transport::{BoxedReader, BoxedWriter};

/// Where the stream comes from
#[derive(Debug, Clone)]
pub enum ConnectTarget {
    /// Launch the agent ourselves
    Spawn(SpawnSpec),
    /// Dial an agent that is already listening
    Remote(ServerAddress),
}

/// An open stream and, when we launched it, the owning process
pub struct Connection {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub process: Option<AgentProcess>,
    /// Human-readable description for logs
    pub description: String,
}

impl Connection {
    /// Wrap an existing pair of halves, e.g. an in-memory pipe.
    pub fn from_streams(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader,
            writer,
            process: None,
            description: "in-memory stream".to_string(),
        }
    }

    /// Open the stream described by `target`.
    pub async fn establish(target: &ConnectTarget) -> TetherResult<Self> {
        match target {
            ConnectTarget::Spawn(spec) => Self::spawn(spec).await,
            ConnectTarget::Remote(address) => Self::dial(address).await,
        }
    }

    async fn spawn(spec: &SpawnSpec) -> TetherResult<Self> {
        let (mut process, stdin, stdout) = AgentProcess::spawn(spec)?;

        match &spec.mode {
            SpawnMode::Stdio => {
                debug!("using stdio of '{}' as the stream", spec.program);
                Ok(Self {
                    reader: Box::new(stdout),
                    writer: Box::new(stdin),
                    process: Some(process),
                    description: format!("stdio of '{}'", spec.program),
                })
            }
            SpawnMode::Socket { startup_timeout } => {
                // Some agents exit on stdin EOF
                process.hold_stdin(stdin);
                let port = process::wait_for_port(&mut process, stdout, *startup_timeout).await?;
                info!("agent announced port {}", port);
                let stream = TcpStream::connect((address::DEFAULT_HOST, port))
                    .await
                    .map_err(|e| {
                        TetherError::connection(format!(
                            "failed to connect to agent on port {}: {}",
                            port, e
                        ))
                    })?;
                let (reader, writer) = stream.into_split();
                Ok(Self {
                    reader: Box::new(reader),
                    writer: Box::new(writer),
                    process: Some(process),
                    description: format!("{}:{}", address::DEFAULT_HOST, port),
                })
            }
        }
    }

    async fn dial(address: &ServerAddress) -> TetherResult<Self> {
        let stream = TcpStream::connect((address.host(), address.port()))
            .await
            .map_err(|e| TetherError::connection(format!("failed to connect to {}: {}", address, e)))?;
        stream.set_nodelay(true).ok();
        info!("connected to agent at {}", address);
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            process: None,
            description: address.to_string(),
        })
    }
}
