//! Request correlation over a framed duplex stream
//!
//! # Features
//! - Monotonic request ids and a pending-request table
//! - A single background read loop per connection
//! - Inbound requests and notifications handed to an [`InboundHandler`]
//! - Pending requests rejected with `ConnectionClosed` when the stream ends

mod pending;
mod responder;

pub use pending::{PendingRequests, ResponseHandle};
pub use responder::Responder;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{TetherError, TetherResult};
use crate::protocol::{RequestId, RpcError, RpcMessage, RpcNotification, RpcRequest, RpcResponse};
use crate::transport::{BoxedReader, BoxedWriter, FrameReader, FrameSink};

/// Receives everything the remote side initiates.
///
/// Called from the read loop, so implementations must hand long-running work
/// to a spawned task instead of blocking.
pub trait InboundHandler: Send + Sync + 'static {
    fn on_notification(&self, notification: RpcNotification);

    fn on_request(&self, request: RpcRequest, responder: Responder);
}

/// JSON-RPC endpoint that correlates our requests with their responses
pub struct RpcClient {
    sink: Arc<FrameSink>,
    pending: Arc<PendingRequests>,
    next_id: AtomicU64,
    /// Cancelled when shutdown is requested
    shutdown: CancellationToken,
    /// Cancelled when the read loop has finished
    terminated: CancellationToken,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    /// Start the read loop over `reader` and return the client.
    pub fn start(
        reader: BoxedReader,
        writer: BoxedWriter,
        handler: Arc<dyn InboundHandler>,
    ) -> Arc<Self> {
        let sink = Arc::new(FrameSink::new(writer));
        let pending = Arc::new(PendingRequests::new());
        let shutdown = CancellationToken::new();
        let terminated = CancellationToken::new();

        let reader_task = tokio::spawn(read_loop(
            FrameReader::new(reader),
            ReadLoopContext {
                sink: Arc::clone(&sink),
                pending: Arc::clone(&pending),
                handler,
                shutdown: shutdown.clone(),
                terminated: terminated.clone(),
            },
        ));

        Arc::new(Self {
            sink,
            pending,
            next_id: AtomicU64::new(1),
            shutdown,
            terminated,
            reader_task: Mutex::new(Some(reader_task)),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Write a request and return its result handle without waiting.
    pub async fn request(&self, method: &str, params: Option<Value>) -> TetherResult<ResponseHandle> {
        if !self.is_connected() {
            return Err(TetherError::ConnectionClosed);
        }

        let id = self.next_request_id();
        let mut request = RpcRequest::new(id, method);
        if let Some(params) = params {
            request = request.with_params(params);
        }

        let handle = self.pending.register(id);
        if let Err(e) = self.sink.send(&RpcMessage::Request(request)).await {
            self.pending.cancel(id);
            return Err(e);
        }
        debug!("sent request {} ({})", id, method);
        Ok(handle)
    }

    /// Send a request and decode its result.
    #[instrument(skip(self, params), level = "debug")]
    pub async fn call<T, P>(&self, method: &str, params: P) -> TetherResult<T>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let params = serde_json::to_value(params)?;
        let params = if params.is_null() { None } else { Some(params) };
        let result = self.request(method, params).await?.await?;
        serde_json::from_value(result).map_err(|e| {
            TetherError::serialization(format!("invalid result for {}: {}", method, e))
        })
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> TetherResult<()> {
        let mut notification = RpcNotification::new(method);
        if let Some(params) = params {
            notification = notification.with_params(params);
        }
        self.sink.send(&RpcMessage::Notification(notification)).await
    }

    /// Whether the stream is still usable
    pub fn is_connected(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.terminated.is_cancelled() && !self.sink.is_closed()
    }

    /// Number of requests still awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolves once the read loop has stopped for any reason.
    pub async fn closed(&self) {
        self.terminated.cancelled().await
    }

    /// Stop the read loop, close the stream and reject pending requests.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.sink.close().await;
        let rejected = self.pending.drain(&TetherError::ConnectionClosed);
        if rejected > 0 {
            debug!("rejected {} pending request(s) on shutdown", rejected);
        }

        let task = self.reader_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.pending.drain(&TetherError::ConnectionClosed);
    }
}

struct ReadLoopContext {
    sink: Arc<FrameSink>,
    pending: Arc<PendingRequests>,
    handler: Arc<dyn InboundHandler>,
    shutdown: CancellationToken,
    terminated: CancellationToken,
}

async fn read_loop(frames: FrameReader<BoxedReader>, ctx: ReadLoopContext) {
    if AssertUnwindSafe(read_frames(frames, &ctx))
        .catch_unwind()
        .await
        .is_err()
    {
        error!("read loop panicked; closing connection");
    }

    ctx.sink.mark_closed();
    let rejected = ctx.pending.drain(&TetherError::ConnectionClosed);
    if rejected > 0 {
        warn!("connection lost with {} request(s) pending", rejected);
    }
    ctx.terminated.cancel();
}

async fn read_frames(mut frames: FrameReader<BoxedReader>, ctx: &ReadLoopContext) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => {
                debug!("read loop stopped by shutdown");
                break;
            }
            frame = frames.read_frame() => frame,
        };

        match frame {
            Ok(Some(body)) => route_frame(&body, ctx),
            Ok(None) => {
                info!("remote side closed the stream");
                break;
            }
            Err(TetherError::Protocol { message }) => {
                warn!("skipping malformed frame: {}", message);
            }
            Err(e) => {
                // A read failure after an explicit close is the expected way out
                if ctx.shutdown.is_cancelled() {
                    debug!("read loop ended after shutdown: {}", e);
                } else {
                    error!("error reading from stream: {}", e);
                }
                break;
            }
        }
    }
}

fn route_frame(body: &[u8], ctx: &ReadLoopContext) {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            warn!("replying to frame with invalid JSON: {}", e);
            Responder::new(RequestId::Null, String::new(), Arc::clone(&ctx.sink))
                .spawn_send(Err(RpcError::parse_error(format!("Parse error: {}", e))));
            return;
        }
    };

    // A request that fails to decode still owes the remote an answer
    let request_id = value
        .get("method")
        .and(value.get("id"))
        .filter(|id| !id.is_null())
        .map(|id| serde_json::from_value(id.clone()).unwrap_or(RequestId::Null));
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let message = match RpcMessage::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            match request_id {
                Some(id) => {
                    warn!("replying to invalid request {}: {}", id, e);
                    Responder::new(id, method, Arc::clone(&ctx.sink))
                        .spawn_send(Err(RpcError::invalid_request(format!("Invalid request: {}", e))));
                }
                None => warn!("dropping unrecognized message: {}", e),
            }
            return;
        }
    };

    match message {
        RpcMessage::Response(response) => complete_response(response, &ctx.pending),
        RpcMessage::Notification(notification) => {
            debug!("received notification {}", notification.method);
            ctx.handler.on_notification(notification);
        }
        RpcMessage::Request(request) => {
            debug!("received request {} ({})", request.id, request.method);
            let responder = Responder::new(
                request.id.clone(),
                request.method.clone(),
                Arc::clone(&ctx.sink),
            );
            ctx.handler.on_request(request, responder);
        }
    }
}

fn complete_response(response: RpcResponse, pending: &PendingRequests) {
    let Some(id) = response.id.as_u64() else {
        warn!("received response with foreign id {}", response.id);
        return;
    };
    let outcome = response.into_result().map_err(TetherError::from);
    if !pending.complete(id, outcome) {
        warn!("received response for unknown request: {}", id);
    }
}
