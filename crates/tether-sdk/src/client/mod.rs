//! The tether client
//!
//! A [`Client`] owns one connection to the agent (spawned or dialed), the
//! registry of sessions opened over it, and the client-wide lifecycle
//! listeners. Connecting happens on `start`, or on first use when
//! `auto_start` is set.

pub mod launch;
pub mod session_config;
pub mod state;
pub mod types;

pub use session_config::SessionConfig;
pub use state::ConnectionState;
pub use types::{AuthStatus, ForegroundSession, ModelInfo, PingResponse, SessionMetadata, StatusResponse};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use tether_core::config::ClientOptions;
use tether_core::connection::{AgentProcess, Connection};
use tether_core::dispatch::Dispatcher;
use tether_core::error::{TetherError, TetherResult};
use tether_core::protocol::{SDK_PROTOCOL_VERSION, methods};
use tether_core::rpc::RpcClient;
use tether_core::session::{LifecycleEvent, LifecycleEvents, Session, SessionRegistry, Subscription};

use types::{LastSessionResponse, ModelsResponse, SessionOpened, SessionsResponse, SuccessResponse};

/// Bound on the protocol-version ping
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for a dying agent so its stderr can be reported
const EXIT_DIAGNOSTIC_WAIT: Duration = Duration::from_secs(1);

struct ActiveConnection {
    rpc: Arc<RpcClient>,
    process: Option<AgentProcess>,
    watcher: JoinHandle<()>,
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// Client for one agent connection
pub struct Client {
    options: ClientOptions,
    sessions: Arc<SessionRegistry>,
    lifecycle: Arc<LifecycleEvents>,
    state: Arc<RwLock<ConnectionState>>,
    active: tokio::sync::Mutex<Option<ActiveConnection>>,
    /// Streams handed in up front instead of spawning or dialing
    preset: Mutex<Option<Connection>>,
}

impl Client {
    /// Create a client. Nothing is spawned until `start` or first use.
    pub fn new(options: ClientOptions) -> TetherResult<Self> {
        options.validate()?;
        Ok(Self::build(options, None))
    }

    /// Create a client over an already open stream, e.g. an in-memory pipe.
    pub fn from_connection(connection: Connection) -> Self {
        Self::build(ClientOptions::default(), Some(connection))
    }

    fn build(options: ClientOptions, preset: Option<Connection>) -> Self {
        Self {
            options,
            sessions: SessionRegistry::new(),
            lifecycle: LifecycleEvents::new(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            active: tokio::sync::Mutex::new(None),
            preset: Mutex::new(preset),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Connect and verify the protocol version. Does nothing if already
    /// started.
    pub async fn start(&self) -> TetherResult<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let (rpc, process) = match self.connect().await {
            Ok(connected) => connected,
            Err(e) => {
                error!("failed to start client: {}", e);
                self.set_state(ConnectionState::Error);
                return Err(e);
            }
        };
        self.set_state(ConnectionState::Connected);

        let watcher = {
            let rpc = Arc::clone(&rpc);
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                rpc.closed().await;
                let mut state = state.write();
                if *state == ConnectionState::Connected {
                    warn!("connection to agent lost");
                    *state = ConnectionState::Error;
                }
            })
        };
        *active = Some(ActiveConnection {
            rpc,
            process,
            watcher,
        });
        info!("client connected");
        Ok(())
    }

    async fn connect(&self) -> TetherResult<(Arc<RpcClient>, Option<AgentProcess>)> {
        let preset = self.preset.lock().take();
        let connection = match preset {
            Some(connection) => connection,
            None => Connection::establish(&launch::connect_target(&self.options)?).await?,
        };
        let Connection {
            reader,
            writer,
            mut process,
            description,
        } = connection;
        debug!("stream open: {}", description);

        let dispatcher = Dispatcher::new(Arc::clone(&self.sessions), Arc::clone(&self.lifecycle));
        let rpc = RpcClient::start(reader, writer, dispatcher);

        if let Err(e) = verify_protocol_version(&rpc).await {
            // A dead agent explains the failure better than the handshake error
            let e = match process.as_mut() {
                Some(agent) if !matches!(e, TetherError::ProtocolMismatch { .. }) => agent
                    .exit_error(EXIT_DIAGNOSTIC_WAIT)
                    .await
                    .unwrap_or(e),
                _ => e,
            };
            rpc.shutdown().await;
            if let Some(mut agent) = process {
                agent.kill().await;
            }
            return Err(e);
        }
        Ok((rpc, process))
    }

    /// Close every session, then the connection.
    ///
    /// Sessions are closed concurrently; a session the agent fails to
    /// release is still closed locally.
    pub async fn stop(&self) {
        let sessions = self.sessions.drain();
        join_all(sessions.iter().map(|session| session.close())).await;
        self.teardown(true).await;
    }

    /// Drop the connection without closing sessions.
    pub async fn force_stop(&self) {
        self.sessions.drain();
        self.teardown(false).await;
    }

    async fn teardown(&self, graceful: bool) {
        let active = self.active.lock().await.take();
        self.set_state(ConnectionState::Disconnected);
        self.preset.lock().take();

        let Some(mut active) = active else {
            return;
        };
        active.watcher.abort();
        active.rpc.shutdown().await;
        if let Some(mut agent) = active.process.take() {
            if graceful {
                agent.shutdown().await;
            } else {
                agent.kill().await;
            }
        }
        info!("client stopped");
    }

    async fn rpc(&self) -> TetherResult<Arc<RpcClient>> {
        {
            let active = self.active.lock().await;
            if let Some(active) = active.as_ref() {
                return Ok(Arc::clone(&active.rpc));
            }
        }
        if !self.options.auto_start {
            return Err(TetherError::NotConnected);
        }
        self.start().await?;
        let active = self.active.lock().await;
        active
            .as_ref()
            .map(|active| Arc::clone(&active.rpc))
            .ok_or(TetherError::NotConnected)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> TetherResult<T> {
        let rpc = self.rpc().await?;
        match self.options.request_timeout() {
            Some(limit) => tokio::time::timeout(limit, rpc.call(method, params))
                .await
                .map_err(|_| TetherError::timeout(limit))?,
            None => rpc.call(method, params).await,
        }
    }

    // Sessions

    /// Open a new session and install its tools, handlers and hooks.
    #[instrument(skip(self, config), level = "debug")]
    pub async fn create_session(&self, config: SessionConfig) -> TetherResult<Arc<Session>> {
        let opened: SessionOpened = self
            .call(methods::SESSION_CREATE, config.to_params(None))
            .await?;
        self.register_session(opened, &config).await
    }

    /// Reattach to an existing session.
    #[instrument(skip(self, config), level = "debug")]
    pub async fn resume_session(
        &self,
        session_id: &str,
        config: SessionConfig,
    ) -> TetherResult<Arc<Session>> {
        let opened: SessionOpened = self
            .call(methods::SESSION_RESUME, config.to_params(Some(session_id)))
            .await?;
        self.register_session(opened, &config).await
    }

    async fn register_session(
        &self,
        opened: SessionOpened,
        config: &SessionConfig,
    ) -> TetherResult<Arc<Session>> {
        let rpc = self.rpc().await?;
        let session = Session::new(
            opened.session_id,
            opened.workspace_path.map(PathBuf::from),
            rpc,
            &self.sessions,
        );
        config.install(&session)?;
        self.sessions.insert(Arc::clone(&session));
        info!(
            "session {} ready ({} tool(s), hooks: {:?})",
            session.session_id(),
            config.tools.len(),
            config.hook_kinds()
        );
        Ok(session)
    }

    /// A session opened by this client, if it is still open
    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id)
    }

    /// Ids of the sessions opened by this client
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.ids()
    }

    /// Every session the agent knows about
    pub async fn list_sessions(&self) -> TetherResult<Vec<SessionMetadata>> {
        let response: SessionsResponse = self.call(methods::SESSION_LIST, json!({})).await?;
        Ok(response.sessions)
    }

    /// Permanently delete a session and its history.
    pub async fn delete_session(&self, session_id: &str) -> TetherResult<()> {
        let response: SuccessResponse = self
            .call(methods::SESSION_DELETE, json!({ "sessionId": session_id }))
            .await?;
        if !response.success {
            return Err(TetherError::other(format!(
                "Failed to delete session {}: {}",
                session_id,
                response.error.as_deref().unwrap_or("unknown error")
            )));
        }
        self.sessions.remove(session_id);
        Ok(())
    }

    /// Id of the most recently used session, if any
    pub async fn get_last_session_id(&self) -> TetherResult<Option<String>> {
        let response: LastSessionResponse =
            self.call(methods::SESSION_GET_LAST_ID, json!({})).await?;
        Ok(response.session_id)
    }

    pub async fn get_foreground_session(&self) -> TetherResult<ForegroundSession> {
        self.call(methods::SESSION_GET_FOREGROUND, json!({})).await
    }

    pub async fn set_foreground_session(&self, session_id: &str) -> TetherResult<()> {
        let response: SuccessResponse = self
            .call(
                methods::SESSION_SET_FOREGROUND,
                json!({ "sessionId": session_id }),
            )
            .await?;
        if !response.success {
            return Err(TetherError::other(format!(
                "Failed to set foreground session {}: {}",
                session_id,
                response.error.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(())
    }

    // Queries

    pub async fn ping(&self, message: Option<&str>) -> TetherResult<PingResponse> {
        self.call(methods::PING, json!({ "message": message.unwrap_or_default() }))
            .await
    }

    pub async fn get_status(&self) -> TetherResult<StatusResponse> {
        self.call(methods::STATUS_GET, json!({})).await
    }

    pub async fn get_auth_status(&self) -> TetherResult<AuthStatus> {
        self.call(methods::AUTH_GET_STATUS, json!({})).await
    }

    pub async fn list_models(&self) -> TetherResult<Vec<ModelInfo>> {
        let response: ModelsResponse = self.call(methods::MODELS_LIST, json!({})).await?;
        Ok(response.models)
    }

    // Lifecycle listeners

    /// Receive every `session.lifecycle` notification.
    pub fn on_lifecycle<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.lifecycle.subscribe(listener)
    }

    /// Receive lifecycle notifications of one type, e.g. `session.created`.
    pub fn on_lifecycle_type<F>(&self, event_type: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.lifecycle.subscribe_type(event_type, listener)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Sessions hold the RPC client; releasing them lets it shut down
        self.sessions.drain();
    }
}

async fn verify_protocol_version(rpc: &RpcClient) -> TetherResult<()> {
    let ping: PingResponse = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        rpc.call(methods::PING, json!({ "message": null })),
    )
    .await
    .map_err(|_| TetherError::timeout(HANDSHAKE_TIMEOUT))??;

    match ping.protocol_version {
        Some(version) if version == SDK_PROTOCOL_VERSION => {
            debug!("agent speaks protocol version {}", version);
            Ok(())
        }
        actual => Err(TetherError::ProtocolMismatch {
            expected: SDK_PROTOCOL_VERSION,
            actual,
        }),
    }
}
